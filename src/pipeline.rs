//! Pipeline composition: a linear chain of stages fixed at build time.
//!
//! A [`Pipeline`] is a plan, not a running object. Building and appending
//! materialise no concurrency; each call to [`Pipeline::materialize`] wires a
//! fresh channel graph and spawns every stage driver, so one plan can back
//! any number of concurrent executions.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use cascade::prelude::*;
//!
//! let pipeline = Pipeline::new(Stage::map(|n: u32| n * 2))
//!     .append(Stage::map(|n| n + 1).with_workers(4));
//!
//! let cancel = CancellationToken::new();
//! let mut results = pipeline.handle(&cancel, 20).await;
//! while let Some(item) = results.next().await {
//!     println!("{item:?}");
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::channel::{Reader, Writer, channel};
use crate::error::EventError;
use crate::result::ResultStream;
use crate::stage::Stage;

type Spin<T, U> = dyn Fn(&CancellationToken) -> (Writer<T>, Reader<U>) + Send + Sync;

/// An immutable linear chain of stages from input type `T` to output type
/// `U`.
///
/// Internally the chain is a composed spin closure: materialising invokes
/// the upstream composition, then spawns this link's stage on its output.
pub struct Pipeline<T, U> {
    spin: Arc<Spin<T, U>>,
}

impl<T, U> Clone for Pipeline<T, U> {
    fn clone(&self) -> Self {
        Self {
            spin: Arc::clone(&self.spin),
        }
    }
}

impl<T, U> Pipeline<T, U>
where
    T: Clone + Send + Sync + 'static,
    U: Send + 'static,
{
    /// Begins a chain with a single stage.
    pub fn new(stage: Stage<T, U>) -> Self {
        Self {
            spin: Arc::new(move |cancel| {
                let (input, writers) = channel(stage.queue_capacity(), cancel.clone());
                let head = writers.writer();
                let tail = stage.spawn(cancel, input);
                (head, tail)
            }),
        }
    }

    /// Appends a stage consuming this chain's output.
    pub fn append<V>(self, stage: Stage<U, V>) -> Pipeline<T, V>
    where
        U: Clone + Sync,
        V: Send + 'static,
    {
        let spin = self.spin;
        Pipeline {
            spin: Arc::new(move |cancel| {
                let (head, upstream) = (spin)(cancel);
                let tail = stage.spawn(cancel, upstream);
                (head, tail)
            }),
        }
    }

    /// Appends a pass-through stage whose error handler is `f`.
    ///
    /// Payload items flow through unchanged; error items are routed to `f`.
    pub fn append_error_handler<F, Fut>(self, f: F) -> Pipeline<T, U>
    where
        U: Clone + Sync,
        F: Fn(CancellationToken, Writer<U>, EventError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.append(Stage::pass_through().with_error_handler(f))
    }

    /// Wires the channel graph and launches every stage driver on `cancel`.
    ///
    /// Returns the head writer, for injecting inputs, and the tail reader,
    /// for draining outputs. Must be called within a tokio runtime.
    pub fn materialize(&self, cancel: &CancellationToken) -> (Writer<T>, Reader<U>) {
        (self.spin)(cancel)
    }

    /// Runs one execution for a single input.
    ///
    /// Materialises a fresh graph under a token derived from `cancel`,
    /// writes `payload`, closes the head, and returns the result stream.
    pub async fn handle(&self, cancel: &CancellationToken, payload: T) -> ResultStream<U> {
        let execution = cancel.child_token();
        let (mut head, tail) = self.materialize(&execution);
        head.write(payload).await;
        head.close();
        ResultStream::new(tail, execution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_single_stage_identity() {
        let pipeline = Pipeline::new(Stage::map(|p: u32| p));
        let cancel = CancellationToken::new();

        let (payloads, errors) = pipeline.handle(&cancel, 7).await.collect().await;
        assert_eq!(payloads, vec![7]);
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn test_append_extends_types() {
        let pipeline = Pipeline::new(Stage::map(|s: &'static str| s.len() as u32))
            .append(Stage::map(|n: u32| n * 2))
            .append(Stage::map(|n: u32| format!("{n}")));

        let cancel = CancellationToken::new();
        let (payloads, errors) = pipeline.handle(&cancel, "four").await.collect().await;
        assert_eq!(payloads, vec!["8".to_string()]);
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn test_materialize_spins_a_fresh_graph_per_call() {
        let pipeline = Pipeline::new(Stage::map(|p: u32| p + 1));
        let cancel = CancellationToken::new();

        for input in [1u32, 10] {
            let (mut head, tail) = pipeline.materialize(&cancel);
            head.write(input).await;
            head.close();

            assert_eq!(tail.read().await.unwrap().into_result().unwrap(), input + 1);
            assert!(tail.read().await.is_none());
        }
    }

    #[tokio::test]
    async fn test_handler_may_emit_many_outputs() {
        let pipeline = Pipeline::new(Stage::new(
            |_cancel, writer: Writer<u32>, count: u32| async move {
                for n in 0..count {
                    writer.write(n).await;
                }
            },
        ));

        let cancel = CancellationToken::new();
        let (payloads, _) = pipeline.handle(&cancel, 5).await.collect().await;
        assert_eq!(payloads, vec![0, 1, 2, 3, 4]);
    }
}
