//! # Cascade
//!
//! A typed, staged, concurrent event-processing pipeline.
//!
//! A pipeline is a linear chain of handlers: each stage consumes items of
//! one type, may produce zero, one, or many items of another, and feeds them
//! to the next stage over a bounded channel. Stages can fan out over worker
//! pools, errors travel the chain as first-class items, and a panicking
//! handler becomes an error item instead of taking the process down.
//!
//! ## Features
//!
//! - **Typed composition**: `Pipeline<T, U>` chains check stage input/output
//!   types at compile time
//! - **Per-stage worker pools**: fan a stage out without touching its
//!   neighbours
//! - **Errors as items**: route, transform, or swallow them per stage
//! - **Coordinated shutdown**: one cancellation token per execution; result
//!   streams drain on close so no worker is ever stranded
//! - **Reusable plans**: a pipeline materialises a fresh graph per
//!   execution; a [`Worker`] feeds one plan from a submission channel
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cascade::prelude::*;
//!
//! let pipeline = Pipeline::new(Stage::map(|n: u32| n * 2))
//!     .append(Stage::map(|n: u32| n + 1).with_workers(4));
//!
//! let cancel = CancellationToken::new();
//! let (payloads, errors) = pipeline.handle(&cancel, 20).await.collect().await;
//! assert_eq!(payloads, vec![41]);
//! assert!(errors.is_empty());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod error;
pub mod event;
pub mod pipeline;
pub mod result;
pub mod stage;
pub mod worker;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::channel::{Reader, Writer};
    pub use crate::error::{BoxError, EventError, SharedError, WorkerStopped};
    pub use crate::event::Event;
    pub use crate::pipeline::Pipeline;
    pub use crate::result::{ErrorPolicy, ResultStream};
    pub use crate::stage::Stage;
    pub use crate::worker::Worker;
    pub use tokio_util::sync::CancellationToken;
}

pub use error::{BoxError, EventError, SharedError, WorkerStopped};
pub use event::{Event, Snapshot};
pub use pipeline::Pipeline;
pub use result::{ErrorPolicy, ResultStream};
pub use stage::Stage;
pub use worker::Worker;
