//! Owned item collection with reducer-style transitions.
//!
//! The store is the only shared mutable resource in the engine. Every
//! status change goes through a transition function here, which is what
//! upholds per-item exclusivity (at most one in-flight extraction per
//! item) and the item invariants under any task interleaving.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{FailureReason, StoreError};
use crate::item::{Item, ItemStatus, NewDocument};

/// Counts over the current collection, recomputed on demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub processing: usize,
    pub pending: usize,
}

/// Payload handed to the gateway call after a successful claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedItem {
    pub id: Uuid,
    pub original_name: String,
    pub content: Arc<[u8]>,
}

#[derive(Default)]
struct StoreInner {
    /// Insertion order is preserved: it drives display order, group
    /// selection order, and the staggered export order.
    items: Vec<Item>,
    batch_active: bool,
}

/// Shared, thread-safe item collection.
#[derive(Clone, Default)]
pub struct ItemStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the inner mutex lock, recovering from poison if necessary.
    fn lock_inner(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned store mutex");
            poisoned.into_inner()
        })
    }

    /// Add one document; returns the new item's id.
    pub fn add(&self, doc: NewDocument) -> Uuid {
        let item = Item::new(doc);
        let id = item.id;
        self.lock_inner().items.push(item);
        id
    }

    /// Add documents preserving their order; returns the new ids.
    pub fn add_many(&self, docs: Vec<NewDocument>) -> Vec<Uuid> {
        let mut inner = self.lock_inner();
        docs.into_iter()
            .map(|doc| {
                let item = Item::new(doc);
                let id = item.id;
                inner.items.push(item);
                id
            })
            .collect()
    }

    /// Remove an item. Rejected while the item has an extraction in
    /// flight — the owning run must be allowed to settle it.
    pub fn remove(&self, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.lock_inner();
        let pos = inner
            .items
            .iter()
            .position(|i| i.id == id)
            .ok_or(StoreError::UnknownItem(id))?;
        if inner.items[pos].status == ItemStatus::Processing {
            return Err(StoreError::ItemBusy(id));
        }
        inner.items.remove(pos);
        Ok(())
    }

    /// Remove every item. Only allowed while no batch run is active and
    /// nothing is in flight; returns the number of items removed.
    pub fn clear(&self) -> Result<usize, StoreError> {
        let mut inner = self.lock_inner();
        if inner.batch_active
            || inner
                .items
                .iter()
                .any(|i| i.status == ItemStatus::Processing)
        {
            return Err(StoreError::BatchActive);
        }
        let count = inner.items.len();
        inner.items.clear();
        Ok(count)
    }

    /// Transition an eligible item into `Processing` and hand out its
    /// payload for the gateway call.
    ///
    /// This is the only way into `Processing`, and it refuses items that
    /// are already in flight or already completed — which is exactly the
    /// per-item exclusivity and success-idempotence guarantee.
    pub fn claim(&self, id: Uuid) -> Result<ClaimedItem, StoreError> {
        let mut inner = self.lock_inner();
        let item = inner
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(StoreError::UnknownItem(id))?;
        if !item.status.is_eligible() {
            return Err(StoreError::ItemBusy(id));
        }
        item.status = ItemStatus::Processing;
        item.failure = None;
        item.settled_at = None;
        Ok(ClaimedItem {
            id: item.id,
            original_name: item.original_name.clone(),
            content: Arc::clone(&item.content),
        })
    }

    /// Settle a claimed item as completed with its extracted value and
    /// derived output name. A concurrently removed item is tolerated;
    /// an item that was never claimed stays untouched.
    pub fn settle_success(&self, id: Uuid, value: String, output_name: String) {
        let mut inner = self.lock_inner();
        let Some(item) = inner.items.iter_mut().find(|i| i.id == id) else {
            tracing::debug!(%id, "Settlement for removed item ignored");
            return;
        };
        if item.status != ItemStatus::Processing {
            tracing::debug!(%id, status = %item.status, "Settlement for unclaimed item ignored");
            return;
        }
        item.status = ItemStatus::Completed;
        item.extracted_value = Some(value);
        item.output_name = output_name;
        item.failure = None;
        item.settled_at = Some(Utc::now());
    }

    /// Settle a claimed item as failed with its reason. The proposed
    /// output name falls back to the original.
    pub fn settle_failure(&self, id: Uuid, reason: FailureReason) {
        let mut inner = self.lock_inner();
        let Some(item) = inner.items.iter_mut().find(|i| i.id == id) else {
            tracing::debug!(%id, "Settlement for removed item ignored");
            return;
        };
        if item.status != ItemStatus::Processing {
            tracing::debug!(%id, status = %item.status, "Settlement for unclaimed item ignored");
            return;
        }
        item.status = ItemStatus::Failed;
        item.failure = Some(reason);
        item.extracted_value = None;
        item.output_name = item.original_name.clone();
        item.settled_at = Some(Utc::now());
    }

    /// Mark a batch run active. The returned guard clears the flag when
    /// dropped; a second call while the guard lives gets `BatchActive`.
    pub fn begin_batch(&self) -> Result<BatchGuard, StoreError> {
        let mut inner = self.lock_inner();
        if inner.batch_active {
            return Err(StoreError::BatchActive);
        }
        inner.batch_active = true;
        Ok(BatchGuard {
            store: self.clone(),
        })
    }

    pub fn batch_active(&self) -> bool {
        self.lock_inner().batch_active
    }

    /// Ids of items with status `Pending` or `Failed`, in insertion order.
    pub fn eligible_ids(&self) -> Vec<Uuid> {
        self.lock_inner()
            .items
            .iter()
            .filter(|i| i.status.is_eligible())
            .map(|i| i.id)
            .collect()
    }

    pub fn get(&self, id: Uuid) -> Option<Item> {
        self.lock_inner().items.iter().find(|i| i.id == id).cloned()
    }

    /// Clone of the whole collection in insertion order. Item payloads are
    /// `Arc`-backed, so this is cheap.
    pub fn snapshot(&self) -> Vec<Item> {
        self.lock_inner().items.clone()
    }

    pub fn summary(&self) -> Summary {
        let inner = self.lock_inner();
        let mut summary = Summary {
            total: inner.items.len(),
            ..Summary::default()
        };
        for item in &inner.items {
            match item.status {
                ItemStatus::Pending => summary.pending += 1,
                ItemStatus::Processing => summary.processing += 1,
                ItemStatus::Completed => summary.completed += 1,
                ItemStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }

    /// "Process all" is available when at least one item is eligible and
    /// no batch run is active.
    pub fn can_process_all(&self) -> bool {
        let inner = self.lock_inner();
        !inner.batch_active && inner.items.iter().any(|i| i.status.is_eligible())
    }

    /// "Download all" is available when at least one item is completed.
    pub fn can_export_all(&self) -> bool {
        self.lock_inner()
            .items
            .iter()
            .any(|i| i.status == ItemStatus::Completed)
    }

    pub fn can_clear(&self) -> bool {
        let inner = self.lock_inner();
        !inner.batch_active
            && !inner
                .items
                .iter()
                .any(|i| i.status == ItemStatus::Processing)
    }
}

/// Holds the batch-active flag for the lifetime of a run.
pub struct BatchGuard {
    store: ItemStore,
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.store.lock_inner().batch_active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(names: &[&str]) -> (ItemStore, Vec<Uuid>) {
        let store = ItemStore::new();
        let ids = store.add_many(
            names
                .iter()
                .map(|n| NewDocument::new(*n, b"%PDF".to_vec()))
                .collect(),
        );
        (store, ids)
    }

    #[test]
    fn test_add_preserves_insertion_order() {
        let (store, ids) = store_with(&["a.pdf", "b.pdf", "c.pdf"]);
        let snapshot = store.snapshot();
        let snapshot_ids: Vec<_> = snapshot.iter().map(|i| i.id).collect();
        assert_eq!(snapshot_ids, ids);
        assert_eq!(snapshot[0].original_name, "a.pdf");
        assert_eq!(snapshot[2].original_name, "c.pdf");
    }

    #[test]
    fn test_claim_moves_to_processing_and_clears_failure() {
        let (store, ids) = store_with(&["a.pdf"]);
        store.claim(ids[0]).unwrap();
        store.settle_failure(ids[0], FailureReason::Connection);

        let item = store.get(ids[0]).unwrap();
        assert_eq!(item.status, ItemStatus::Failed);
        assert_eq!(item.failure, Some(FailureReason::Connection));
        assert!(item.settled_at.is_some());

        // Re-claiming a failed item clears the prior failure.
        store.claim(ids[0]).unwrap();
        let item = store.get(ids[0]).unwrap();
        assert_eq!(item.status, ItemStatus::Processing);
        assert!(item.failure.is_none());
        assert!(item.settled_at.is_none());
    }

    #[test]
    fn test_claim_rejects_processing_and_completed() {
        let (store, ids) = store_with(&["a.pdf"]);
        store.claim(ids[0]).unwrap();
        assert_eq!(store.claim(ids[0]), Err(StoreError::ItemBusy(ids[0])));

        store.settle_success(ids[0], "X9".into(), "X9.pdf".into());
        assert_eq!(store.claim(ids[0]), Err(StoreError::ItemBusy(ids[0])));
    }

    #[test]
    fn test_claim_unknown_item() {
        let (store, _) = store_with(&["a.pdf"]);
        let ghost = Uuid::new_v4();
        assert_eq!(store.claim(ghost), Err(StoreError::UnknownItem(ghost)));
    }

    #[test]
    fn test_settle_success_upholds_invariants() {
        let (store, ids) = store_with(&["scan1.pdf"]);
        store.claim(ids[0]).unwrap();
        store.settle_success(ids[0], "VT-4471".into(), "VT-4471.pdf".into());

        let item = store.get(ids[0]).unwrap();
        assert_eq!(item.status, ItemStatus::Completed);
        assert_eq!(item.extracted_value.as_deref(), Some("VT-4471"));
        assert_eq!(item.output_name, "VT-4471.pdf");
        assert!(item.failure.is_none());
        assert!(item.settled_at.is_some());
    }

    #[test]
    fn test_settle_failure_upholds_invariants() {
        let (store, ids) = store_with(&["scan1.pdf"]);
        store.claim(ids[0]).unwrap();
        store.settle_failure(ids[0], FailureReason::NotFound);

        let item = store.get(ids[0]).unwrap();
        assert_eq!(item.status, ItemStatus::Failed);
        assert!(item.extracted_value.is_none());
        assert_eq!(item.output_name, "scan1.pdf");
        assert_eq!(item.failure_message(), Some(FailureReason::NotFound.user_message()));
    }

    #[test]
    fn test_settle_on_removed_item_is_ignored() {
        let (store, ids) = store_with(&["a.pdf", "b.pdf"]);
        store.remove(ids[0]).unwrap();
        store.settle_success(ids[0], "X".into(), "X.pdf".into());
        store.settle_failure(ids[0], FailureReason::Unknown);
        assert_eq!(store.summary().total, 1);
    }

    #[test]
    fn test_settle_requires_a_prior_claim() {
        let (store, ids) = store_with(&["a.pdf"]);

        // No claim happened: both settlements are ignored.
        store.settle_success(ids[0], "X".into(), "X.pdf".into());
        store.settle_failure(ids[0], FailureReason::Unknown);
        let item = store.get(ids[0]).unwrap();
        assert_eq!(item.status, ItemStatus::Pending);
        assert!(item.extracted_value.is_none());
        assert_eq!(item.output_name, "a.pdf");

        // A settled item cannot be settled again without a fresh claim.
        store.claim(ids[0]).unwrap();
        store.settle_success(ids[0], "X".into(), "X.pdf".into());
        store.settle_failure(ids[0], FailureReason::Unknown);
        assert_eq!(store.get(ids[0]).unwrap().status, ItemStatus::Completed);
    }

    #[test]
    fn test_remove_rejects_processing_item() {
        let (store, ids) = store_with(&["a.pdf"]);
        store.claim(ids[0]).unwrap();
        assert_eq!(store.remove(ids[0]), Err(StoreError::ItemBusy(ids[0])));
        // Item is unchanged and still present.
        assert_eq!(store.get(ids[0]).unwrap().status, ItemStatus::Processing);
    }

    #[test]
    fn test_clear_rejected_while_batch_active_or_in_flight() {
        let (store, ids) = store_with(&["a.pdf", "b.pdf"]);

        let guard = store.begin_batch().unwrap();
        assert_eq!(store.clear(), Err(StoreError::BatchActive));
        drop(guard);

        store.claim(ids[0]).unwrap();
        assert_eq!(store.clear(), Err(StoreError::BatchActive));

        store.settle_failure(ids[0], FailureReason::Unknown);
        assert_eq!(store.clear(), Ok(2));
        assert_eq!(store.summary().total, 0);
    }

    #[test]
    fn test_batch_guard_clears_flag_on_drop() {
        let store = ItemStore::new();
        let guard = store.begin_batch().unwrap();
        assert!(store.batch_active());
        assert_eq!(store.begin_batch().err(), Some(StoreError::BatchActive));
        drop(guard);
        assert!(!store.batch_active());
        assert!(store.begin_batch().is_ok());
    }

    #[test]
    fn test_eligible_ids_in_order() {
        let (store, ids) = store_with(&["a.pdf", "b.pdf", "c.pdf", "d.pdf"]);
        store.claim(ids[1]).unwrap();
        store.settle_success(ids[1], "X".into(), "X.pdf".into());
        store.claim(ids[2]).unwrap();
        store.settle_failure(ids[2], FailureReason::Connection);

        // Pending a, failed c — in insertion order; completed b excluded.
        assert_eq!(store.eligible_ids(), vec![ids[0], ids[2], ids[3]]);
    }

    #[test]
    fn test_summary_counts() {
        let (store, ids) = store_with(&["a.pdf", "b.pdf", "c.pdf", "d.pdf"]);
        store.claim(ids[0]).unwrap();
        store.settle_success(ids[0], "X".into(), "X.pdf".into());
        store.claim(ids[1]).unwrap();
        store.settle_failure(ids[1], FailureReason::Unknown);
        store.claim(ids[2]).unwrap();

        assert_eq!(
            store.summary(),
            Summary {
                total: 4,
                completed: 1,
                failed: 1,
                processing: 1,
                pending: 1,
            }
        );
    }

    #[test]
    fn test_bulk_action_enablement() {
        let store = ItemStore::new();
        assert!(!store.can_process_all());
        assert!(!store.can_export_all());
        assert!(store.can_clear());

        let id = store.add(NewDocument::new("a.pdf", vec![]));
        assert!(store.can_process_all());

        let guard = store.begin_batch().unwrap();
        assert!(!store.can_process_all());
        drop(guard);

        store.claim(id).unwrap();
        assert!(!store.can_clear());
        store.settle_success(id, "X".into(), "X.pdf".into());
        assert!(!store.can_process_all());
        assert!(store.can_export_all());
        assert!(store.can_clear());
    }
}
