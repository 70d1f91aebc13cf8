//! Stage-to-stage transport: a bounded queue with coordinated
//! multi-producer close.
//!
//! A channel decouples a producing stage (N workers) from a consuming stage
//! (M workers). Producers hold [`Writer`]s; registration is the act of
//! holding one, so the underlying queue closes exactly once, when the last
//! writer closes, and items accepted before that point stay drainable.
//!
//! Writes are synchronous from the producer's viewpoint: a write blocks
//! cooperatively while the queue is full and is the only backpressure
//! mechanism. Once the governing token cancels, or the consumer is gone,
//! writes are silently discarded rather than panicking or deadlocking.

use kanal::{AsyncReceiver, AsyncSender};
use tokio_util::sync::CancellationToken;

use crate::error::EventError;
use crate::event::Event;

/// Creates a bounded channel governed by `cancel`.
///
/// Returns the single consuming [`Reader`] and a [`WriterFactory`] that hands
/// out registered producers. A capacity of 0 is bumped to 1.
pub fn channel<T>(capacity: usize, cancel: CancellationToken) -> (Reader<T>, WriterFactory<T>) {
    let (tx, rx) = kanal::bounded_async(capacity.max(1));
    (Reader { rx }, WriterFactory { tx, cancel })
}

/// The consuming end of a channel.
///
/// Handed to one stage driver; its worker pool shares the handle.
pub struct Reader<T> {
    rx: AsyncReceiver<Event<T>>,
}

impl<T> Clone for Reader<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<T> Reader<T> {
    /// Takes the next item, or `None` once the queue is drained and every
    /// registered writer has closed.
    pub async fn read(&self) -> Option<Event<T>> {
        self.rx.recv().await.ok()
    }
}

/// Hands out registered [`Writer`]s for one channel.
///
/// The factory itself holds a producer registration; drop it once the
/// stage's writers have been handed out, or the channel never closes.
pub struct WriterFactory<T> {
    tx: AsyncSender<Event<T>>,
    cancel: CancellationToken,
}

impl<T> WriterFactory<T> {
    /// Registers and returns a fresh writer.
    pub fn writer(&self) -> Writer<T> {
        Writer {
            tx: Some(self.tx.clone()),
            cancel: self.cancel.clone(),
        }
    }
}

/// A registered producer handle onto a channel.
///
/// Cloning registers an additional producer. Dropping the writer closes it;
/// the queue closes once the last registered writer has closed.
pub struct Writer<T> {
    tx: Option<AsyncSender<Event<T>>>,
    cancel: CancellationToken,
}

impl<T> Clone for Writer<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<T> Writer<T> {
    /// Enqueues a payload item, blocking while the queue is full.
    ///
    /// Discarded silently if this writer is closed, the governing token has
    /// cancelled, or the consumer is gone.
    pub async fn write(&self, payload: T) {
        self.send(Event::Payload(payload)).await;
    }

    /// Enqueues an error item. Same discard semantics as [`Writer::write`].
    pub async fn write_error(&self, err: EventError) {
        self.send(Event::Error(err)).await;
    }

    async fn send(&self, event: Event<T>) {
        let Some(tx) = &self.tx else { return };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {}
            result = tx.send(event) => {
                // Err means the reader is gone; the item is discarded.
                let _ = result;
            }
        }
    }

    /// Closes this writer. Idempotent; writes after close are discarded.
    pub fn close(&mut self) {
        self.tx = None;
    }

    /// True once this writer has been closed.
    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    #[tokio::test]
    async fn test_write_read_in_order() {
        let cancel = CancellationToken::new();
        let (reader, factory) = channel::<u32>(4, cancel);
        let writer = factory.writer();
        drop(factory);

        writer.write(1).await;
        writer.write(2).await;
        writer.write(3).await;
        drop(writer);

        let mut seen = Vec::new();
        while let Some(event) = reader.read().await {
            seen.push(event.into_result().unwrap());
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_queue_closes_when_last_writer_closes() {
        let cancel = CancellationToken::new();
        let (reader, factory) = channel::<u32>(4, cancel);
        let mut first = factory.writer();
        let second = factory.writer();
        drop(factory);

        first.write(1).await;
        first.close();
        first.close(); // idempotent

        // Still open: `second` is registered.
        second.write(2).await;
        assert_eq!(reader.read().await.unwrap().into_result().unwrap(), 1);
        drop(second);

        // Buffered item stays visible after the close decision.
        assert_eq!(reader.read().await.unwrap().into_result().unwrap(), 2);
        assert!(reader.read().await.is_none());
    }

    #[tokio::test]
    async fn test_write_after_close_is_discarded() {
        let cancel = CancellationToken::new();
        let (reader, factory) = channel::<u32>(4, cancel);
        let mut writer = factory.writer();
        drop(factory);

        writer.close();
        writer.write(9).await;
        assert!(writer.is_closed());
        assert!(reader.read().await.is_none());
    }

    #[tokio::test]
    async fn test_write_after_cancel_is_discarded() {
        let cancel = CancellationToken::new();
        let (reader, factory) = channel::<u32>(4, cancel.clone());
        let writer = factory.writer();
        drop(factory);

        cancel.cancel();
        writer.write(9).await;
        drop(writer);
        assert!(reader.read().await.is_none());
    }

    #[tokio::test]
    async fn test_blocked_write_unblocks_on_cancel() {
        let cancel = CancellationToken::new();
        let (reader, factory) = channel::<u32>(1, cancel.clone());
        let writer = factory.writer();
        drop(factory);

        writer.write(1).await;

        let blocked = tokio::spawn(async move {
            // Queue is full; this write parks until cancellation.
            writer.write(2).await;
        });

        tokio::task::yield_now().await;
        cancel.cancel();

        timeout(Duration::from_secs(1), blocked)
            .await
            .expect("blocked write must resolve after cancel")
            .unwrap();
        drop(reader);
    }

    #[tokio::test]
    async fn test_write_after_reader_drop_does_not_panic() {
        let cancel = CancellationToken::new();
        let (reader, factory) = channel::<u32>(1, cancel);
        let writer = factory.writer();
        drop(factory);
        drop(reader);

        timeout(Duration::from_secs(1), writer.write(1))
            .await
            .expect("write to a dead channel must not block");
    }

    #[tokio::test]
    async fn test_capacity_blocks_until_drained() {
        let cancel = CancellationToken::new();
        let (reader, factory) = channel::<u32>(1, cancel);
        let writer = factory.writer();
        drop(factory);

        writer.write(1).await;

        let pending = tokio::spawn(async move {
            writer.write(2).await;
            drop(writer);
        });

        assert_eq!(reader.read().await.unwrap().into_result().unwrap(), 1);
        assert_eq!(reader.read().await.unwrap().into_result().unwrap(), 2);
        assert!(reader.read().await.is_none());
        pending.await.unwrap();
    }
}
