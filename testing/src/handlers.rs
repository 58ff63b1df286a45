//! Event handlers that record what they were given.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned locks

use ledger_core::{EventEnvelope, EventHandler, HandlerError};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// Ordered log of `(handler name, envelope)` shared between handlers.
#[derive(Clone, Debug, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<(String, EventEnvelope)>>>,
}

impl CallLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler names in invocation order.
    #[must_use]
    pub fn handler_names(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(name, _)| name.clone()).collect()
    }

    /// Envelopes in invocation order.
    #[must_use]
    pub fn envelopes(&self) -> Vec<EventEnvelope> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, envelope)| envelope.clone())
            .collect()
    }

    /// Number of recorded calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// True when nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.lock().unwrap().is_empty()
    }

    fn push(&self, name: &str, envelope: &EventEnvelope) {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), envelope.clone()));
    }
}

/// Records every call and succeeds.
#[derive(Clone, Debug)]
pub struct RecordingHandler {
    name: String,
    log: CallLog,
}

impl RecordingHandler {
    /// Handler named `name` writing to `log`.
    #[must_use]
    pub fn new(name: impl Into<String>, log: CallLog) -> Self {
        Self {
            name: name.into(),
            log,
        }
    }
}

impl EventHandler for RecordingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle<'a>(
        &'a self,
        envelope: &'a EventEnvelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
        Box::pin(async move {
            self.log.push(&self.name, envelope);
            Ok(())
        })
    }
}

/// Records every call and then fails.
#[derive(Clone, Debug)]
pub struct FailingHandler {
    name: String,
    log: CallLog,
}

impl FailingHandler {
    /// Handler named `name` writing to `log`.
    #[must_use]
    pub fn new(name: impl Into<String>, log: CallLog) -> Self {
        Self {
            name: name.into(),
            log,
        }
    }
}

impl EventHandler for FailingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle<'a>(
        &'a self,
        envelope: &'a EventEnvelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
        Box::pin(async move {
            self.log.push(&self.name, envelope);
            Err(HandlerError::Other(format!("{} always fails", self.name)))
        })
    }
}
