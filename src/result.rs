//! The caller-facing result stream of one pipeline execution.
//!
//! A [`ResultStream`] is a lazy, cancellable sequence over the pipeline's
//! tail reader. Closing it (explicitly, through an aggregator, or by drop)
//! cancels the execution and releases every stage worker, so a consumer that
//! stops early can never strand a producer on a full channel.

use tokio_util::sync::CancellationToken;

use crate::channel::Reader;
use crate::error::EventError;

/// How aggregators treat error items.
pub enum ErrorPolicy {
    /// The first error terminates iteration.
    FailFast,
    /// Errors are handed to the callback; iteration continues.
    Skip(Box<dyn FnMut(EventError) + Send>),
}

impl ErrorPolicy {
    /// A skip policy routing each error to `f`.
    pub fn skip<F>(f: F) -> Self
    where
        F: FnMut(EventError) + Send + 'static,
    {
        ErrorPolicy::Skip(Box::new(f))
    }
}

/// Lazy, cancellable sequence of one execution's output items.
///
/// Items arrive in wire order: payloads as `Ok`, error items as `Err`. The
/// stream owns the execution's derived token; [`ResultStream::close`] (and
/// every consuming aggregator) cancels it and drains the tail, and dropping
/// the stream cancels it and disconnects the tail, either way freeing any
/// stage worker still blocked on a full channel.
pub struct ResultStream<T> {
    reader: Reader<T>,
    cancel: CancellationToken,
    closed: bool,
}

impl<T> ResultStream<T> {
    pub(crate) fn new(reader: Reader<T>, cancel: CancellationToken) -> Self {
        Self {
            reader,
            cancel,
            closed: false,
        }
    }

    /// Takes the next item, or `None` at end of stream.
    pub async fn next(&mut self) -> Option<Result<T, EventError>> {
        if self.closed {
            return None;
        }
        Some(self.reader.read().await?.into_result())
    }

    /// Cancels the execution and drains the tail to end of stream.
    /// Idempotent.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.cancel.cancel();
        while self.reader.read().await.is_some() {}
    }

    /// Returns the first error item, exhausting the stream.
    pub async fn first_error(mut self) -> Option<EventError> {
        let mut found = None;
        while let Some(item) = self.next().await {
            if let Err(err) = item {
                found = Some(err);
                break;
            }
        }
        self.close().await;
        found
    }

    /// Collects every error item, exhausting the stream.
    pub async fn errors(mut self) -> Vec<EventError> {
        let mut errors = Vec::new();
        while let Some(item) = self.next().await {
            if let Err(err) = item {
                errors.push(err);
            }
        }
        self.close().await;
        errors
    }

    /// Collects all payloads and errors in arrival order.
    pub async fn collect(mut self) -> (Vec<T>, Vec<EventError>) {
        let mut payloads = Vec::new();
        let mut errors = Vec::new();
        while let Some(item) = self.next().await {
            match item {
                Ok(payload) => payloads.push(payload),
                Err(err) => errors.push(err),
            }
        }
        self.close().await;
        (payloads, errors)
    }

    /// Folds payload items into an accumulator.
    ///
    /// Under [`ErrorPolicy::FailFast`] the fold stops at the first error and
    /// returns the accumulator as it stood at that moment, together with the
    /// error. Under a skip policy errors go to the callback and the second
    /// element is `None`.
    pub async fn fold<A, F>(
        mut self,
        seed: A,
        mut combine: F,
        mut policy: ErrorPolicy,
    ) -> (A, Option<EventError>)
    where
        F: FnMut(A, T) -> A,
    {
        let mut acc = seed;
        let mut failure = None;
        while let Some(item) = self.next().await {
            match item {
                Ok(payload) => acc = combine(acc, payload),
                Err(err) => match policy {
                    ErrorPolicy::FailFast => {
                        failure = Some(err);
                        break;
                    }
                    ErrorPolicy::Skip(ref mut skip) => skip(err),
                },
            }
        }
        self.close().await;
        (acc, failure)
    }

    /// Invokes `f(index, payload)` for each payload item; the index counts
    /// payloads delivered to `f`.
    ///
    /// Returns the first error under [`ErrorPolicy::FailFast`], `None`
    /// otherwise.
    pub async fn for_each<F>(mut self, mut f: F, mut policy: ErrorPolicy) -> Option<EventError>
    where
        F: FnMut(usize, T),
    {
        let mut index = 0;
        let mut failure = None;
        while let Some(item) = self.next().await {
            match item {
                Ok(payload) => {
                    f(index, payload);
                    index += 1;
                }
                Err(err) => match policy {
                    ErrorPolicy::FailFast => {
                        failure = Some(err);
                        break;
                    }
                    ErrorPolicy::Skip(ref mut skip) => skip(err),
                },
            }
        }
        self.close().await;
        failure
    }

    /// Stops as soon as `pred` returns true for an item.
    ///
    /// Returns whether iteration was interrupted before the stream ended.
    pub async fn interrupt_when<F>(mut self, mut pred: F) -> bool
    where
        F: FnMut(&Result<T, EventError>) -> bool,
    {
        let mut interrupted = false;
        while let Some(item) = self.next().await {
            if pred(&item) {
                interrupted = true;
                break;
            }
        }
        self.close().await;
        interrupted
    }
}

impl<T> Drop for ResultStream<T> {
    fn drop(&mut self) {
        // The reader drops with us, disconnecting the tail channel; blocked
        // producers wake and discard, so an abandoned stream cannot leak.
        if !self.closed {
            self.cancel.cancel();
        }
    }
}
