//! Hand-rolled test doubles shared by the crate's tests and by
//! downstream crates that exercise the scheduler without a live gateway.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::error::ExtractError;
use crate::item::NewDocument;
use crate::runner::{BatchEvent, BatchReporter};
use crate::traits::{Exporter, Extractor};

/// Build a `NewDocument` from a name and raw bytes.
pub fn doc(name: &str, content: &[u8]) -> NewDocument {
    NewDocument {
        name: name.to_string(),
        content: content.to_vec(),
    }
}

/// Scriptable [`Extractor`]: responses are keyed by document content, with
/// a fallback default. Tracks call count and the peak number of calls in
/// flight, and can be slowed down or gated for scheduling tests.
#[derive(Clone)]
pub struct MockExtractor {
    responses: Arc<Mutex<HashMap<Vec<u8>, Result<String, ExtractError>>>>,
    default: Arc<Mutex<Result<String, ExtractError>>>,
    pause: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
    calls: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExtractor {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            default: Arc::new(Mutex::new(Err(ExtractError::Unknown(
                "no scripted response".to_string(),
            )))),
            pause: None,
            gate: None,
            calls: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Script the response for documents with this exact content.
    pub fn responding(self, content: &[u8], result: Result<String, ExtractError>) -> Self {
        self.set_response(content, result);
        self
    }

    /// Response used when no scripted entry matches.
    pub fn with_default(self, result: Result<String, ExtractError>) -> Self {
        *self.default.lock().unwrap() = result;
        self
    }

    /// Sleep this long inside every call.
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = Some(pause);
        self
    }

    /// Every call consumes one permit from `gate` before answering, so
    /// tests can hold calls in flight and release them one by one.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Re-script a response mid-test.
    pub fn set_response(&self, content: &[u8], result: Result<String, ExtractError>) {
        self.responses
            .lock()
            .unwrap()
            .insert(content.to_vec(), result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

impl Extractor for MockExtractor {
    async fn extract(&self, content: &[u8]) -> Result<String, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if let Some(pause) = self.pause {
            tokio::time::sleep(pause).await;
        }

        let result = self
            .responses
            .lock()
            .unwrap()
            .get(content)
            .cloned()
            .unwrap_or_else(|| self.default.lock().unwrap().clone());

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// In-memory [`Exporter`] that records every delivered file and can be
/// told to fail for specific names.
#[derive(Clone, Default)]
pub struct MockExporter {
    delivered: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    failing: Arc<Mutex<Vec<String>>>,
}

impl MockExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make exports of this name fail with `PermissionDenied`.
    pub fn failing_on(self, name: &str) -> Self {
        self.failing.lock().unwrap().push(name.to_string());
        self
    }

    pub fn delivered(&self) -> Vec<(String, Vec<u8>)> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn delivered_names(&self) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl Exporter for MockExporter {
    async fn export(&self, name: &str, content: &[u8]) -> Result<(), std::io::Error> {
        if self.failing.lock().unwrap().iter().any(|n| n == name) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "scripted export failure",
            ));
        }
        self.delivered
            .lock()
            .unwrap()
            .push((name.to_string(), content.to_vec()));
        Ok(())
    }
}

/// [`BatchReporter`] that records the label of every event it sees.
#[derive(Clone, Default)]
pub struct MockReporter {
    labels: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labels(&self) -> Vec<String> {
        self.labels.lock().unwrap().clone()
    }
}

impl BatchReporter for MockReporter {
    fn report(&self, event: BatchEvent<'_>) {
        let label = match event {
            BatchEvent::BatchStarted { .. } => "BatchStarted",
            BatchEvent::GroupStarted { .. } => "GroupStarted",
            BatchEvent::ItemCompleted { .. } => "ItemCompleted",
            BatchEvent::ItemFailed { .. } => "ItemFailed",
            BatchEvent::GroupSettled { .. } => "GroupSettled",
            BatchEvent::BatchFinished { .. } => "BatchFinished",
        };
        self.labels.lock().unwrap().push(label.to_string());
    }
}
