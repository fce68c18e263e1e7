//! Ordered speech job queue between the stream loop and playback.
//!
//! Multiple producers, one consumer. The channel is bounded, so a stream
//! that outruns playback waits for space instead of buffering without limit.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{ChatError, Result};
use crate::pipeline::epoch::EpochController;
use crate::pipeline::messages::SpeechJob;

/// Create a queue with room for `capacity` waiting jobs.
pub fn speech_queue(capacity: usize, epochs: EpochController) -> (SpeechQueue, SpeechJobReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let queued = Arc::new(AtomicUsize::new(0));
    (
        SpeechQueue {
            tx,
            epochs,
            queued: Arc::clone(&queued),
        },
        SpeechJobReceiver { rx, queued },
    )
}

/// Producer handle. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SpeechQueue {
    tx: mpsc::Sender<SpeechJob>,
    epochs: EpochController,
    queued: Arc<AtomicUsize>,
}

impl SpeechQueue {
    /// Append `job` at the tail, waiting for capacity if the queue is full.
    ///
    /// Returns `Ok(false)` without enqueuing when the job's epoch has been
    /// superseded by the time space is available.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Channel`] if the playback consumer has shut down.
    pub async fn enqueue(&self, job: SpeechJob) -> Result<bool> {
        let permit = self
            .tx
            .reserve()
            .await
            .map_err(|_| ChatError::Channel("speech queue closed".to_owned()))?;
        let epoch = job.epoch;
        let sent = self.epochs.run_if_current(epoch, move || {
            self.queued.fetch_add(1, Ordering::SeqCst);
            permit.send(job);
        });
        if sent.is_none() {
            debug!(epoch, "not enqueuing speech job from superseded epoch");
        }
        Ok(sent.is_some())
    }

    /// Number of jobs sent and not yet taken by the consumer.
    ///
    /// Slots reserved by producers still waiting on the epoch gate are not
    /// counted.
    pub fn pending(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side, owned by the playback coordinator.
#[derive(Debug)]
pub struct SpeechJobReceiver {
    rx: mpsc::Receiver<SpeechJob>,
    queued: Arc<AtomicUsize>,
}

impl SpeechJobReceiver {
    /// Next job in enqueue order; `None` once every producer is gone.
    pub async fn recv(&mut self) -> Option<SpeechJob> {
        let job = self.rx.recv().await?;
        self.queued.fetch_sub(1, Ordering::SeqCst);
        Some(job)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::time::Duration;

    use super::*;
    use crate::pipeline::messages::Segment;

    fn job(text: &str, epoch: u64) -> SpeechJob {
        SpeechJob::new(Segment::new("", text), epoch)
    }

    #[tokio::test]
    async fn preserves_fifo_order() {
        let epochs = EpochController::new();
        let epoch = epochs.begin_epoch();
        let (queue, mut rx) = speech_queue(8, epochs);

        for text in ["a", "b", "c"] {
            assert!(queue.enqueue(job(text, epoch)).await.unwrap());
        }
        assert_eq!(queue.pending(), 3);
        for text in ["a", "b", "c"] {
            assert_eq!(rx.recv().await.unwrap().segment.text, text);
        }
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn reserved_slots_are_not_pending() {
        let epochs = EpochController::new();
        let epoch = epochs.begin_epoch();
        let (queue, mut rx) = speech_queue(4, epochs);

        let permit = queue.tx.reserve().await.unwrap();
        assert_eq!(queue.pending(), 0);

        assert!(queue.enqueue(job("a", epoch)).await.unwrap());
        assert_eq!(queue.pending(), 1);
        drop(permit);
        assert_eq!(queue.pending(), 1);

        rx.recv().await.unwrap();
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn stale_jobs_are_not_enqueued() {
        let epochs = EpochController::new();
        let old = epochs.begin_epoch();
        let (queue, _rx) = speech_queue(8, epochs.clone());
        epochs.begin_epoch();

        assert!(!queue.enqueue(job("late", old)).await.unwrap());
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn full_queue_applies_back_pressure() {
        let epochs = EpochController::new();
        let epoch = epochs.begin_epoch();
        let (queue, mut rx) = speech_queue(1, epochs);

        assert!(queue.enqueue(job("first", epoch)).await.unwrap());
        let blocked = tokio::time::timeout(Duration::from_millis(50), queue.enqueue(job("second", epoch))).await;
        assert!(blocked.is_err(), "enqueue should wait while the queue is full");

        assert_eq!(rx.recv().await.unwrap().segment.text, "first");
        assert!(queue.enqueue(job("second", epoch)).await.unwrap());
        assert_eq!(rx.recv().await.unwrap().segment.text, "second");
    }

    #[tokio::test]
    async fn closed_consumer_is_an_error() {
        let epochs = EpochController::new();
        let epoch = epochs.begin_epoch();
        let (queue, rx) = speech_queue(4, epochs);
        drop(rx);
        assert!(queue.is_closed());
        assert!(matches!(
            queue.enqueue(job("x", epoch)).await,
            Err(ChatError::Channel(_))
        ));
    }
}
