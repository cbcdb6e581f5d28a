// src/observe.rs

//! Structured per-file observation.
//!
//! The pipeline reports every per-file outcome through an injected
//! [`Observer`] rather than a global logger; the default observer
//! forwards to `tracing` with one field per attribute, which the JSON
//! subscriber renders as a structured record.

use tracing::{error, info};

/// What happened to one input file (or URL) within a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Fully processed and recorded in the stage manifest.
    Processed,
    /// Skipped; already present in the stage manifest or on disk.
    Skipped,
    /// Processing failed; the file stays out of the manifest and will
    /// be retried on the next run.
    Failed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Processed => "processed",
            EventKind::Skipped => "skipped",
            EventKind::Failed => "failed",
        }
    }
}

/// One structured record: resource, stage, file, kind, detail.
#[derive(Debug, Clone)]
pub struct StageEvent {
    pub resource: String,
    pub stage: String,
    pub file: String,
    pub kind: EventKind,
    pub detail: Option<String>,
}

impl StageEvent {
    pub fn new(resource: &str, stage: &str, file: &str, kind: EventKind) -> Self {
        Self {
            resource: resource.to_string(),
            stage: stage.to_string(),
            file: file.to_string(),
            kind,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Sink for stage events. Implementations must tolerate being called
/// once per input file.
pub trait Observer {
    fn event(&self, event: StageEvent);
}

/// Default observer: forwards events to `tracing`.
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn event(&self, event: StageEvent) {
        let detail = event.detail.as_deref().unwrap_or("");
        match event.kind {
            EventKind::Failed => error!(
                resource = %event.resource,
                stage = %event.stage,
                file = %event.file,
                kind = event.kind.as_str(),
                detail = %detail,
            ),
            _ => info!(
                resource = %event.resource,
                stage = %event.stage,
                file = %event.file,
                kind = event.kind.as_str(),
                detail = %detail,
            ),
        }
    }
}

/// Test observer that keeps every event it sees.
#[cfg(test)]
pub struct CollectingObserver {
    pub events: std::cell::RefCell<Vec<StageEvent>>,
}

#[cfg(test)]
impl CollectingObserver {
    pub fn new() -> Self {
        Self {
            events: std::cell::RefCell::new(Vec::new()),
        }
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.borrow().iter().map(|e| e.kind).collect()
    }
}

#[cfg(test)]
impl Observer for CollectingObserver {
    fn event(&self, event: StageEvent) {
        self.events.borrow_mut().push(event);
    }
}
