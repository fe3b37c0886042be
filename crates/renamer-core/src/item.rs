use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FailureReason;

/// Status of a document item in the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Processing => "processing",
            ItemStatus::Completed => "completed",
            ItemStatus::Failed => "failed",
        }
    }

    /// Settled, not in flight. `Completed` stays terminal; `Failed` items
    /// are settled but remain eligible for another attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Failed)
    }

    /// Candidate for (re)processing by the scheduler.
    pub fn is_eligible(&self) -> bool {
        matches!(self, ItemStatus::Pending | ItemStatus::Failed)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ItemStatus::Pending),
            "processing" => Ok(ItemStatus::Processing),
            "completed" => Ok(ItemStatus::Completed),
            "failed" => Ok(ItemStatus::Failed),
            _ => Err(format!("Unknown item status: {}", s)),
        }
    }
}

/// A document handed to the engine by the file-selection collaborator.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub name: String,
    pub content: Vec<u8>,
}

impl NewDocument {
    pub fn new(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content,
        }
    }
}

/// One document tracked through the extraction/rename lifecycle.
///
/// Invariants (upheld by the store's transition functions):
/// - `Completed` implies `extracted_value` is set and `failure` is `None`.
/// - `Failed` implies `failure` is set and `extracted_value` is `None`.
/// - `output_name` is derived from `extracted_value` when present,
///   otherwise equals `original_name`.
#[derive(Debug, Clone)]
pub struct Item {
    pub id: Uuid,
    pub original_name: String,
    pub output_name: String,
    pub extracted_value: Option<String>,
    pub status: ItemStatus,
    pub failure: Option<FailureReason>,
    /// Raw document payload. Never mutated; `Arc` keeps the concurrent
    /// gateway calls from copying the bytes.
    pub content: Arc<[u8]>,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Item {
    pub fn new(doc: NewDocument) -> Self {
        let size_bytes = doc.content.len() as u64;
        Self {
            id: Uuid::new_v4(),
            output_name: doc.name.clone(),
            original_name: doc.name,
            extracted_value: None,
            status: ItemStatus::Pending,
            failure: None,
            content: Arc::from(doc.content),
            size_bytes,
            created_at: Utc::now(),
            settled_at: None,
        }
    }

    /// User-facing failure message, present only for `Failed` items.
    pub fn failure_message(&self) -> Option<&'static str> {
        self.failure.map(|r| r.user_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            ItemStatus::Pending,
            ItemStatus::Processing,
            ItemStatus::Completed,
            ItemStatus::Failed,
        ] {
            let s = status.as_str();
            let parsed: ItemStatus = s.parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_terminal_and_eligible() {
        assert!(!ItemStatus::Pending.is_terminal());
        assert!(!ItemStatus::Processing.is_terminal());
        assert!(ItemStatus::Completed.is_terminal());
        assert!(ItemStatus::Failed.is_terminal());

        assert!(ItemStatus::Pending.is_eligible());
        assert!(ItemStatus::Failed.is_eligible());
        assert!(!ItemStatus::Processing.is_eligible());
        assert!(!ItemStatus::Completed.is_eligible());
    }

    #[test]
    fn test_new_item_starts_pending() {
        let item = Item::new(NewDocument::new("scan1.pdf", vec![1, 2, 3]));
        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.original_name, "scan1.pdf");
        assert_eq!(item.output_name, "scan1.pdf");
        assert_eq!(item.size_bytes, 3);
        assert!(item.extracted_value.is_none());
        assert!(item.failure.is_none());
        assert!(item.settled_at.is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Item::new(NewDocument::new("a.pdf", vec![]));
        let b = Item::new(NewDocument::new("a.pdf", vec![]));
        assert_ne!(a.id, b.id);
    }
}
