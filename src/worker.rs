//! Long-lived workers that feed one pipeline plan repeatedly.
//!
//! A [`Worker`] accepts payloads on a submission channel and runs one
//! pipeline execution per payload, delivering each execution's
//! [`ResultStream`](crate::result::ResultStream) to a sink callback. The
//! worker lives until its token cancels; shutdown waits for in-flight
//! executions before refusing further submissions.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::WorkerStopped;
use crate::pipeline::Pipeline;
use crate::result::ResultStream;

type SinkFn<U> = dyn Fn(ResultStream<U>) -> BoxFuture<'static, ()> + Send + Sync;

/// A long-lived submitter running one pipeline plan per submitted payload.
///
/// The submission channel is a rendezvous: an accepted submission is one the
/// driver loop is actually receiving, so nothing sits in limbo when the
/// worker stops.
pub struct Worker<T> {
    submissions: kanal::AsyncSender<T>,
    running: Arc<AtomicBool>,
}

impl<T> Worker<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Starts a worker around `pipeline`, delivering each execution's result
    /// stream to `sink`.
    ///
    /// The sink is expected to exhaust the stream; if it abandons it, the
    /// stream's drop semantics still cancel and release the execution.
    pub fn spawn<U, S, Fut>(cancel: CancellationToken, sink: S, pipeline: Pipeline<T, U>) -> Self
    where
        U: Send + 'static,
        S: Fn(ResultStream<U>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = kanal::bounded_async::<T>(0);
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let sink: Arc<SinkFn<U>> = Arc::new(move |stream| sink(stream).boxed());

        tokio::spawn(async move {
            debug!("worker driver started");
            let mut executions = JoinSet::new();

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    submission = rx.recv() => match submission {
                        Ok(payload) => {
                            let pipeline = pipeline.clone();
                            let sink = Arc::clone(&sink);
                            let cancel = cancel.clone();
                            executions.spawn(async move {
                                // handle() derives a per-payload token, so
                                // one execution's lifetime never outlives
                                // the worker's.
                                let stream = pipeline.handle(&cancel, payload).await;
                                sink(stream).await;
                            });
                        }
                        Err(_) => break,
                    },
                }
            }

            while executions.join_next().await.is_some() {}
            flag.store(false, Ordering::Release);
            let _ = rx.close();
            debug!("worker driver stopped");
        });

        Self {
            submissions: tx,
            running,
        }
    }

    /// Enqueues a payload for processing.
    ///
    /// Fails with [`WorkerStopped`] once the worker has shut down; a
    /// submission blocked at shutdown is woken and fails the same way.
    pub async fn handle(&self, payload: T) -> Result<(), WorkerStopped> {
        if !self.running.load(Ordering::Acquire) {
            return Err(WorkerStopped);
        }
        self.submissions
            .send(payload)
            .await
            .map_err(|_| WorkerStopped)
    }

    /// False once the worker has shut down.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}
