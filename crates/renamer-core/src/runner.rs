//! Batch scheduler: drives concurrency-bounded extraction over the
//! eligible items, group by group.
//!
//! Eligible items (`Pending` or `Failed`) are taken in insertion order and
//! partitioned into groups of at most `batch_size`. Calls within a group
//! run concurrently; groups run strictly sequentially with a full barrier
//! between them, which bounds outstanding gateway calls to `batch_size`.

use futures::future::join_all;
use uuid::Uuid;

use crate::error::{FailureReason, StoreError};
use crate::rename;
use crate::store::{ClaimedItem, ItemStore, Summary};
use crate::traits::Extractor;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Concurrency cap: maximum gateway calls in flight at once.
    pub batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { batch_size: 10 }
    }
}

impl BatchConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// Events emitted by the scheduler for monitoring/logging.
#[derive(Debug, Clone)]
pub enum BatchEvent<'a> {
    BatchStarted {
        eligible: usize,
        groups: usize,
    },
    GroupStarted {
        index: usize,
        size: usize,
    },
    ItemCompleted {
        id: Uuid,
        output_name: &'a str,
    },
    ItemFailed {
        id: Uuid,
        reason: FailureReason,
        message: &'a str,
    },
    GroupSettled {
        index: usize,
    },
    BatchFinished {
        summary: Summary,
    },
}

/// Trait for receiving scheduler events (decoupled logging).
pub trait BatchReporter: Send + Sync {
    fn report(&self, event: BatchEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingBatchReporter;

impl BatchReporter for TracingBatchReporter {
    fn report(&self, event: BatchEvent<'_>) {
        match event {
            BatchEvent::BatchStarted { eligible, groups } => {
                tracing::info!(%eligible, %groups, "Batch run started");
            }
            BatchEvent::GroupStarted { index, size } => {
                tracing::debug!(group = %index, %size, "Group started");
            }
            BatchEvent::ItemCompleted { id, output_name } => {
                tracing::info!(%id, %output_name, "Item completed");
            }
            BatchEvent::ItemFailed {
                id,
                reason,
                message,
            } => {
                tracing::warn!(%id, %reason, %message, "Item failed");
            }
            BatchEvent::GroupSettled { index } => {
                tracing::debug!(group = %index, "Group settled");
            }
            BatchEvent::BatchFinished { summary } => {
                tracing::info!(
                    completed = summary.completed,
                    failed = summary.failed,
                    total = summary.total,
                    "Batch run finished"
                );
            }
        }
    }
}

/// Drives extraction over an [`ItemStore`] through an [`Extractor`].
#[derive(Clone)]
pub struct BatchRunner<E: Extractor> {
    store: ItemStore,
    extractor: E,
    config: BatchConfig,
}

impl<E: Extractor> BatchRunner<E> {
    pub fn new(store: ItemStore, extractor: E, config: BatchConfig) -> Self {
        Self {
            store,
            extractor,
            config,
        }
    }

    pub fn store(&self) -> &ItemStore {
        &self.store
    }

    /// Run one batch over every eligible item.
    ///
    /// Returns `BatchActive` if another run holds the flag and
    /// `NothingEligible` when no item is pending or failed. A single
    /// item's failure never aborts the run; every selected item ends the
    /// run settled as `Completed` or `Failed`.
    pub async fn run<R: BatchReporter>(&self, reporter: &R) -> Result<Summary, StoreError> {
        let _guard = self.store.begin_batch()?;

        let eligible = self.store.eligible_ids();
        if eligible.is_empty() {
            return Err(StoreError::NothingEligible);
        }

        let batch_size = self.config.batch_size.max(1);
        reporter.report(BatchEvent::BatchStarted {
            eligible: eligible.len(),
            groups: eligible.len().div_ceil(batch_size),
        });

        for (index, group) in eligible.chunks(batch_size).enumerate() {
            // Claim the whole group up front; items removed or settled by a
            // concurrent manual retry since selection are skipped.
            let claimed: Vec<ClaimedItem> = group
                .iter()
                .filter_map(|id| match self.store.claim(*id) {
                    Ok(claimed) => Some(claimed),
                    Err(e) => {
                        tracing::debug!(%id, error = %e, "Skipping item no longer claimable");
                        None
                    }
                })
                .collect();

            reporter.report(BatchEvent::GroupStarted {
                index,
                size: claimed.len(),
            });

            // Full barrier: the next group starts only once every call in
            // this group has settled.
            join_all(
                claimed
                    .into_iter()
                    .map(|item| self.process_one(item, reporter)),
            )
            .await;

            reporter.report(BatchEvent::GroupSettled { index });
        }

        let summary = self.store.summary();
        reporter.report(BatchEvent::BatchFinished { summary });
        Ok(summary)
    }

    /// Re-process a single item outside a batch run (manual retry).
    ///
    /// Rejected while a batch run is active, while the item is already in
    /// flight, or once it has completed.
    pub async fn retry_item<R: BatchReporter>(
        &self,
        id: Uuid,
        reporter: &R,
    ) -> Result<(), StoreError> {
        if self.store.batch_active() {
            return Err(StoreError::BatchActive);
        }
        let claimed = self.store.claim(id)?;
        self.process_one(claimed, reporter).await;
        Ok(())
    }

    /// One gateway call plus settlement. Every failure is converted into a
    /// `Failed` transition here; nothing escapes to the group level.
    async fn process_one<R: BatchReporter>(&self, item: ClaimedItem, reporter: &R) {
        let ClaimedItem {
            id,
            original_name,
            content,
        } = item;

        match self.extractor.extract(&content).await {
            Ok(value) => match rename::output_name(&value, &original_name) {
                Some(name) => {
                    self.store
                        .settle_success(id, value.trim().to_string(), name.clone());
                    reporter.report(BatchEvent::ItemCompleted {
                        id,
                        output_name: &name,
                    });
                }
                // Success with an empty identifier counts as not found.
                None => {
                    self.store.settle_failure(id, FailureReason::NotFound);
                    reporter.report(BatchEvent::ItemFailed {
                        id,
                        reason: FailureReason::NotFound,
                        message: FailureReason::NotFound.user_message(),
                    });
                }
            },
            Err(err) => {
                let reason = err.reason();
                if reason == FailureReason::MalformedResponse {
                    tracing::warn!(%id, error = %err, "Unexpected response shape from gateway");
                }
                let message = err.to_string();
                self.store.settle_failure(id, reason);
                reporter.report(BatchEvent::ItemFailed {
                    id,
                    reason,
                    message: &message,
                });
            }
        }
    }
}
