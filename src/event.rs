//! Wire items flowing between pipeline stages.
//!
//! Every value travelling stage-to-stage is an [`Event`]: either a payload of
//! the stage's input type or an [`EventError`](crate::error::EventError).
//! Events are value-semantic and flow one way; they are never mutated after
//! creation.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::EventError;

/// A single item on the wire: a payload or an error.
///
/// Payload items carry the data a stage's handler consumes; error items carry
/// a failure produced upstream and are routed to the stage's error handler
/// instead.
#[derive(Debug)]
pub enum Event<T> {
    /// A payload to be handled.
    Payload(T),
    /// An error threaded through the chain in place of a payload.
    Error(EventError),
}

impl<T> Event<T> {
    /// Returns the payload, if this is a payload item.
    pub fn payload(&self) -> Option<&T> {
        match self {
            Event::Payload(payload) => Some(payload),
            Event::Error(_) => None,
        }
    }

    /// Returns the error, if this is an error item.
    pub fn err(&self) -> Option<&EventError> {
        match self {
            Event::Payload(_) => None,
            Event::Error(err) => Some(err),
        }
    }

    /// True if this item carries an error.
    pub fn is_err(&self) -> bool {
        matches!(self, Event::Error(_))
    }

    /// Converts the item into a `Result`.
    pub fn into_result(self) -> Result<T, EventError> {
        match self {
            Event::Payload(payload) => Ok(payload),
            Event::Error(err) => Err(err),
        }
    }
}

/// A type-erased snapshot of the payload that triggered an error.
///
/// Error items cross stage boundaries, so the offending payload's type is
/// erased on capture. Consumers that know the stage's input type can get it
/// back with [`Snapshot::downcast_ref`]. Snapshots share their storage, so
/// cloning one (or an error item carrying one) is cheap.
#[derive(Clone)]
pub struct Snapshot(Arc<dyn Any + Send + Sync>);

impl Snapshot {
    /// Captures a snapshot of `value`.
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Returns the snapshot as a `&T` if it was captured from a `T`.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Snapshot(..)")
    }
}
