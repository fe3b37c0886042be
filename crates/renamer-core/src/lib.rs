pub mod error;
pub mod export;
pub mod item;
pub mod rename;
pub mod runner;
pub mod store;
pub mod testutil;
pub mod traits;

pub use error::{ExtractError, FailureReason, StoreError};
pub use export::{ExportConfig, ExportError, ExportService};
pub use item::{Item, ItemStatus, NewDocument};
pub use runner::{BatchConfig, BatchEvent, BatchReporter, BatchRunner, TracingBatchReporter};
pub use store::{ItemStore, Summary};
pub use traits::{Exporter, Extractor};
