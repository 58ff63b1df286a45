//! In-process fan-out of ledger events to registered handlers.
//!
//! The dispatcher is built once at service start, handlers are registered on
//! it, and it is then shared read-only (`Arc<EventDispatcher>`). `dispatch`
//! awaits each handler for the event's name in registration order on the
//! calling task. A handler failure is logged and reported; it never stops the
//! remaining handlers.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

use crate::event::{EventEnvelope, EventError, EventName};
use crate::event_bus::EventBusError;

/// Error returned by an [`EventHandler`].
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The broker rejected the message.
    #[error("publish failed: {0}")]
    Publish(#[from] EventBusError),

    /// The envelope could not be encoded.
    #[error("encoding failed: {0}")]
    Encode(#[from] EventError),

    /// Any other handler-specific failure.
    #[error("{0}")]
    Other(String),
}

/// Error returned by [`EventDispatcher::register`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatcherError {
    /// The same handler instance is already registered for this name.
    #[error("handler '{handler}' already registered for {event}")]
    HandlerAlreadyRegistered {
        /// Event name
        event: EventName,
        /// Handler name
        handler: String,
    },
}

/// Reacts to dispatched events.
pub trait EventHandler: Send + Sync {
    /// Name used in logs and dispatch reports.
    fn name(&self) -> &str;

    /// Handles one event.
    ///
    /// # Errors
    ///
    /// Any [`HandlerError`]; the dispatcher records it and moves on.
    fn handle<'a>(
        &'a self,
        envelope: &'a EventEnvelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>>;
}

/// One failed handler invocation.
#[derive(Debug)]
pub struct HandlerFailure {
    /// Name of the failing handler
    pub handler: String,
    /// What went wrong
    pub error: HandlerError,
}

/// Outcome of a single [`EventDispatcher::dispatch`] call.
#[derive(Debug)]
pub struct DispatchReport {
    /// Event that was dispatched
    pub event: EventName,
    /// Handlers invoked, including failing ones
    pub invoked: usize,
    /// Handlers that returned an error, in invocation order
    pub failures: Vec<HandlerFailure>,
}

impl DispatchReport {
    /// True when every handler succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Registry of handlers keyed by event name.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<EventName, Vec<Arc<dyn EventHandler>>>,
}

impl EventDispatcher {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `handler` to the list for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatcherError::HandlerAlreadyRegistered`] when this exact
    /// handler instance is already registered for `event`.
    pub fn register(
        &mut self,
        event: EventName,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), DispatcherError> {
        let handlers = self.handlers.entry(event).or_default();
        if handlers.iter().any(|existing| Arc::ptr_eq(existing, &handler)) {
            return Err(DispatcherError::HandlerAlreadyRegistered {
                event,
                handler: handler.name().to_string(),
            });
        }
        tracing::debug!(event = %event, handler = handler.name(), "Registered event handler");
        handlers.push(handler);
        Ok(())
    }

    /// Removes `handler` from the list for `event`, if present.
    pub fn remove(&mut self, event: EventName, handler: &Arc<dyn EventHandler>) {
        if let Some(handlers) = self.handlers.get_mut(&event) {
            handlers.retain(|existing| !Arc::ptr_eq(existing, handler));
        }
    }

    /// True when `handler` is registered for `event`.
    #[must_use]
    pub fn has(&self, event: EventName, handler: &Arc<dyn EventHandler>) -> bool {
        self.handlers
            .get(&event)
            .is_some_and(|handlers| handlers.iter().any(|existing| Arc::ptr_eq(existing, handler)))
    }

    /// Number of handlers registered for `event`.
    #[must_use]
    pub fn handler_count(&self, event: EventName) -> usize {
        self.handlers.get(&event).map_or(0, Vec::len)
    }

    /// Drops every registration.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Runs every handler registered for the envelope's name, in order.
    pub async fn dispatch(&self, envelope: &EventEnvelope) -> DispatchReport {
        let event = envelope.name();
        let mut report = DispatchReport {
            event,
            invoked: 0,
            failures: Vec::new(),
        };

        let Some(handlers) = self.handlers.get(&event) else {
            tracing::debug!(event = %event, "No handlers registered");
            return report;
        };

        for handler in handlers {
            report.invoked += 1;
            if let Err(error) = handler.handle(envelope).await {
                tracing::warn!(
                    event = %event,
                    handler = handler.name(),
                    error = %error,
                    "Event handler failed"
                );
                report.failures.push(HandlerFailure {
                    handler: handler.name().to_string(),
                    error,
                });
            }
        }

        report
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<_, _> = self
            .handlers
            .iter()
            .map(|(event, handlers)| (*event, handlers.len()))
            .collect();
        f.debug_struct("EventDispatcher").field("handlers", &counts).finish()
    }
}
