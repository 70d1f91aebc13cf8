//! Error types for cascade.

use std::sync::Arc;

use thiserror::Error;

use crate::event::Snapshot;

/// Boxed error type accepted when building error items.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared error type carried inside error items.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// An item-level error flowing through the pipeline.
///
/// Errors are not fatal to a stage: they travel the wire as regular items and
/// each stage's error handler decides to pass them through, transform them,
/// swallow them, or emit replacement payloads. The source and payload
/// snapshot are shared, so cloning an error item is cheap.
#[derive(Debug, Clone, Error)]
pub enum EventError {
    /// A handler reported a failure for one input item.
    #[error("handler failed: {source}")]
    Handler {
        /// The error the handler reported.
        source: SharedError,
        /// Snapshot of the payload that triggered the failure.
        payload: Option<Snapshot>,
    },

    /// A handler panicked; the panic was trapped at stage scope and converted
    /// into this item.
    #[error("recovered from panic: {message}")]
    Panic {
        /// The panic payload, rendered as text.
        message: String,
        /// Snapshot of the input the handler was processing.
        payload: Option<Snapshot>,
    },

    /// Written by handlers that observe cancellation and choose to surface
    /// it. The library itself never synthesises this.
    #[error("pipeline cancelled")]
    Cancelled,
}

impl EventError {
    /// Wraps a handler failure together with the offending payload.
    pub fn from_handler<T: Send + Sync + 'static>(source: impl Into<BoxError>, payload: T) -> Self {
        EventError::Handler {
            source: Arc::from(source.into()),
            payload: Some(Snapshot::new(payload)),
        }
    }

    /// Builds a trapped-panic error.
    pub fn panic(message: impl Into<String>, payload: Option<Snapshot>) -> Self {
        EventError::Panic {
            message: message.into(),
            payload,
        }
    }

    /// Snapshot of the input that caused this error, when one was captured.
    pub fn payload_snapshot(&self) -> Option<&Snapshot> {
        match self {
            EventError::Handler { payload, .. } | EventError::Panic { payload, .. } => {
                payload.as_ref()
            }
            EventError::Cancelled => None,
        }
    }

    /// True if this error was trapped from a panicking handler.
    pub fn is_panic(&self) -> bool {
        matches!(self, EventError::Panic { .. })
    }
}

/// Returned by [`Worker::handle`](crate::worker::Worker::handle) once the
/// worker has shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("worker is stopped")]
pub struct WorkerStopped;
