//! Delivery of renamed documents through an [`Exporter`].
//!
//! Bulk export walks the completed items in insertion order and paces the
//! triggers with a fixed stagger so a burst of a few dozen deliveries does
//! not overwhelm the receiving side.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::item::ItemStatus;
use crate::store::ItemStore;
use crate::traits::Exporter;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unknown item: {0}")]
    UnknownItem(Uuid),
    #[error("export of '{name}' failed: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Delay inserted between consecutive bulk-export triggers.
    pub stagger: Duration,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            stagger: Duration::from_millis(200),
        }
    }
}

impl ExportConfig {
    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }
}

pub struct ExportService<X: Exporter> {
    store: ItemStore,
    exporter: X,
    config: ExportConfig,
}

impl<X: Exporter> ExportService<X> {
    pub fn new(store: ItemStore, exporter: X, config: ExportConfig) -> Self {
        Self {
            store,
            exporter,
            config,
        }
    }

    /// Deliver a single item under its current output name.
    pub async fn export_item(&self, id: Uuid) -> Result<(), ExportError> {
        let item = self.store.get(id).ok_or(ExportError::UnknownItem(id))?;
        self.exporter
            .export(&item.output_name, &item.content)
            .await
            .map_err(|source| ExportError::Io {
                name: item.output_name,
                source,
            })
    }

    /// Deliver every completed item in insertion order, pausing for the
    /// configured stagger between triggers. A failed delivery is logged
    /// and skipped; the sweep continues. Returns the number delivered.
    pub async fn export_all(&self) -> usize {
        let completed: Vec<_> = self
            .store
            .snapshot()
            .into_iter()
            .filter(|item| item.status == ItemStatus::Completed)
            .collect();

        let mut delivered = 0;
        for (index, item) in completed.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.stagger).await;
            }
            match self.exporter.export(&item.output_name, &item.content).await {
                Ok(()) => {
                    tracing::debug!(id = %item.id, name = %item.output_name, "Item exported");
                    delivered += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        id = %item.id,
                        name = %item.output_name,
                        error = %e,
                        "Export failed, continuing with the rest"
                    );
                }
            }
        }
        delivered
    }
}
