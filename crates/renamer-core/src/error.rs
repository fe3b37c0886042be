use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Category recorded on a `Failed` item, shown to the user inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Auth,
    QuotaExceeded,
    Connection,
    NotFound,
    MalformedResponse,
    Unknown,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Auth => "auth",
            FailureReason::QuotaExceeded => "quota_exceeded",
            FailureReason::Connection => "connection",
            FailureReason::NotFound => "not_found",
            FailureReason::MalformedResponse => "malformed_response",
            FailureReason::Unknown => "unknown",
        }
    }

    /// User-facing message for an item that failed with this reason.
    pub fn user_message(&self) -> &'static str {
        match self {
            FailureReason::Auth => "Authentication failed: check the configured API key.",
            FailureReason::QuotaExceeded => "Quota exceeded. Try again in a few moments.",
            FailureReason::Connection => "Connection to the extraction service failed.",
            FailureReason::NotFound => "No identifier was found in the document.",
            FailureReason::MalformedResponse => {
                "The extraction service returned an unreadable response."
            }
            FailureReason::Unknown => "Error while processing the document.",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Failure returned by the extraction gateway for a single document.
///
/// The gateway contract is tagged: expected failure modes come back as a
/// variant here, never as a panic. Anything the adapter cannot classify
/// lands in `Unknown`.
#[derive(Error, Debug, Clone)]
pub enum ExtractError {
    /// Credential/authorization failure from the gateway.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Rate/quota limit hit.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Transport-level failure (connect, timeout).
    #[error("connection failed: {0}")]
    Connection(String),

    /// The gateway ran but found no extractable identifier.
    #[error("no identifier found in document")]
    NotFound,

    /// The gateway returned data the adapter could not interpret.
    #[error("malformed gateway response: {0}")]
    MalformedResponse(String),

    /// Any other fault raised during the call.
    #[error("extraction failed: {0}")]
    Unknown(String),
}

impl ExtractError {
    /// Map this error to the category recorded on the failed item.
    pub fn reason(&self) -> FailureReason {
        match self {
            ExtractError::Auth(_) => FailureReason::Auth,
            ExtractError::QuotaExceeded(_) => FailureReason::QuotaExceeded,
            ExtractError::Connection(_) => FailureReason::Connection,
            ExtractError::NotFound => FailureReason::NotFound,
            ExtractError::MalformedResponse(_) => FailureReason::MalformedResponse,
            ExtractError::Unknown(_) => FailureReason::Unknown,
        }
    }
}

/// Rejected operation on the item collection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("item {0} not found")]
    UnknownItem(Uuid),

    /// Per-item exclusivity: the item already has an extraction in flight.
    #[error("item {0} is currently processing")]
    ItemBusy(Uuid),

    /// A batch run is already active; overlapping runs and destructive
    /// bulk actions are rejected while the flag is set.
    #[error("a batch run is already active")]
    BatchActive,

    #[error("no item is pending or failed")]
    NothingEligible,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_mapping() {
        assert_eq!(
            ExtractError::Auth("403".into()).reason(),
            FailureReason::Auth
        );
        assert_eq!(
            ExtractError::QuotaExceeded("429".into()).reason(),
            FailureReason::QuotaExceeded
        );
        assert_eq!(
            ExtractError::Connection("refused".into()).reason(),
            FailureReason::Connection
        );
        assert_eq!(ExtractError::NotFound.reason(), FailureReason::NotFound);
        assert_eq!(
            ExtractError::MalformedResponse("bad json".into()).reason(),
            FailureReason::MalformedResponse
        );
        assert_eq!(
            ExtractError::Unknown("boom".into()).reason(),
            FailureReason::Unknown
        );
    }

    #[test]
    fn test_every_reason_has_a_user_message() {
        for reason in [
            FailureReason::Auth,
            FailureReason::QuotaExceeded,
            FailureReason::Connection,
            FailureReason::NotFound,
            FailureReason::MalformedResponse,
            FailureReason::Unknown,
        ] {
            assert!(!reason.user_message().is_empty());
        }
    }

    #[test]
    fn test_reason_serde_form() {
        let json = serde_json::to_string(&FailureReason::QuotaExceeded).unwrap();
        assert_eq!(json, "\"quota_exceeded\"");
    }
}
