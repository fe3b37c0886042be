use std::future::Future;

use crate::error::ExtractError;

/// Extracts an identifier from raw document bytes.
///
/// This is the gateway boundary: one asynchronous call per item. Expected
/// failure modes come back as an [`ExtractError`] variant — the gateway
/// must not panic for them. The scheduler does not retry within a call;
/// retry is a user/scheduler-level operation.
pub trait Extractor: Send + Sync + Clone {
    fn extract(&self, content: &[u8]) -> impl Future<Output = Result<String, ExtractError>> + Send;
}

/// Receives `(output_name, content)` for a completed item and triggers the
/// save/download side effect. Stateless from the engine's point of view.
pub trait Exporter: Send + Sync {
    fn export(
        &self,
        name: &str,
        content: &[u8],
    ) -> impl Future<Output = Result<(), std::io::Error>> + Send;
}
