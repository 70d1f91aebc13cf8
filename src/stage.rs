//! Stage plans and the worker-pool driver that runs them.
//!
//! A [`Stage`] pairs a handler with an error handler and a worker count.
//! Nothing runs until a pipeline materialises: the driver then spawns the
//! pool, each worker draining the upstream reader, dispatching payload items
//! to the handler and error items to the error handler, and publishing the
//! output through its own registered writer.
//!
//! Every dispatch runs under panic containment: an unwinding handler becomes
//! exactly one error item downstream, and sibling workers keep running.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::channel::{Reader, Writer, channel};
use crate::error::{BoxError, EventError};
use crate::event::{Event, Snapshot};

type HandlerFn<T, U> =
    dyn Fn(CancellationToken, Writer<U>, T) -> BoxFuture<'static, ()> + Send + Sync;
type ErrorHandlerFn<U> =
    dyn Fn(CancellationToken, Writer<U>, EventError) -> BoxFuture<'static, ()> + Send + Sync;

/// One stage of a pipeline: a handler, its error routing, and the size of
/// its worker pool.
///
/// A stage is an immutable plan. It can be captured by any number of
/// [`Pipeline`](crate::pipeline::Pipeline)s and materialised many times.
///
/// The handler receives the governing token, a [`Writer`] for the stage's
/// output channel, and one payload; it may write zero, one, or many items
/// and/or error items.
pub struct Stage<T, U> {
    handler: Arc<HandlerFn<T, U>>,
    error_handler: Arc<ErrorHandlerFn<U>>,
    workers: usize,
}

impl<T, U> Clone for Stage<T, U> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            error_handler: Arc::clone(&self.error_handler),
            workers: self.workers,
        }
    }
}

impl<T, U> Stage<T, U>
where
    T: Clone + Send + Sync + 'static,
    U: Send + 'static,
{
    /// Creates a stage from a raw handler.
    ///
    /// Defaults: one worker, and an error handler that re-emits error items
    /// downstream unchanged.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(CancellationToken, Writer<U>, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |cancel, writer, payload| {
                handler(cancel, writer, payload).boxed()
            }),
            error_handler: Arc::new(|_cancel, writer, err| {
                async move { writer.write_error(err).await }.boxed()
            }),
            workers: 1,
        }
    }

    /// Creates a stage from a fallible one-in/one-out function.
    ///
    /// `Ok` writes the value downstream; `Err` writes an
    /// [`EventError::Handler`] wrapping the error and the offending payload.
    pub fn from_fn<F, Fut, E>(f: F) -> Self
    where
        F: Fn(CancellationToken, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<U, E>> + Send + 'static,
        E: Into<BoxError> + Send,
    {
        Self::new(move |cancel, writer, payload: T| {
            let snapshot = payload.clone();
            let fut = f(cancel, payload);
            async move {
                match fut.await {
                    Ok(value) => writer.write(value).await,
                    Err(err) => {
                        writer
                            .write_error(EventError::from_handler(err, snapshot))
                            .await;
                    }
                }
            }
        })
    }

    /// Creates a stage from an infallible mapping function.
    pub fn map<F>(f: F) -> Self
    where
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        Self::new(move |_cancel, writer, payload| {
            let value = f(payload);
            async move { writer.write(value).await }
        })
    }

    /// Sets the worker-pool size for this stage. Zero is treated as one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Replaces the error handler invoked for error items reaching this
    /// stage.
    pub fn with_error_handler<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(CancellationToken, Writer<U>, EventError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.error_handler = Arc::new(move |cancel, writer, err| f(cancel, writer, err).boxed());
        self
    }

    /// The configured worker-pool size.
    pub fn workers(&self) -> usize {
        self.workers
    }

    pub(crate) fn queue_capacity(&self) -> usize {
        self.workers.max(1)
    }

    /// Spawns this stage's worker pool draining `input`, and returns the
    /// reader of the stage's output channel.
    ///
    /// The output channel closes itself once every worker has exited and
    /// closed its writer.
    pub(crate) fn spawn(&self, cancel: &CancellationToken, input: Reader<T>) -> Reader<U> {
        let (output, writers) = channel(self.queue_capacity(), cancel.clone());

        for index in 0..self.workers.max(1) {
            let input = input.clone();
            let writer = writers.writer();
            let handler = Arc::clone(&self.handler);
            let error_handler = Arc::clone(&self.error_handler);
            let cancel = cancel.clone();

            tokio::spawn(async move {
                trace!(worker = index, "stage worker started");
                loop {
                    let event = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        event = input.read() => match event {
                            Some(event) => event,
                            None => break,
                        },
                    };

                    match event {
                        Event::Payload(payload) => {
                            let snapshot = payload.clone();
                            let dispatch = AssertUnwindSafe(handler(
                                cancel.clone(),
                                writer.clone(),
                                payload,
                            ))
                            .catch_unwind();
                            if let Err(panic) = dispatch.await {
                                writer
                                    .write_error(EventError::panic(
                                        panic_message(panic),
                                        Some(Snapshot::new(snapshot)),
                                    ))
                                    .await;
                            }
                        }
                        Event::Error(err) => {
                            let snapshot = err.clone();
                            let dispatch = AssertUnwindSafe(error_handler(
                                cancel.clone(),
                                writer.clone(),
                                err,
                            ))
                            .catch_unwind();
                            if let Err(panic) = dispatch.await {
                                writer
                                    .write_error(EventError::panic(
                                        panic_message(panic),
                                        Some(Snapshot::new(snapshot)),
                                    ))
                                    .await;
                            }
                        }
                    }
                }
                trace!(worker = index, "stage worker finished");
            });
        }

        output
    }
}

impl<T> Stage<T, T>
where
    T: Clone + Send + Sync + 'static,
{
    /// An identity stage: every payload is forwarded unchanged.
    ///
    /// With the default error handler this stage is observationally
    /// transparent; give it [`Stage::with_error_handler`] to intercept error
    /// items without touching payloads.
    pub fn pass_through() -> Self {
        Self::new(|_cancel, writer, payload| async move { writer.write(payload).await })
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(message) => *message,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "opaque panic payload".to_string(),
        },
    }
}
