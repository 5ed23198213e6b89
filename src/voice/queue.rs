//! Bounded handoff between the capture callback and the control loop
//!
//! Single producer (audio callback), single consumer (control loop). When the
//! queue is full the oldest frame is evicted so the producer never waits.
//! Both ends sit on one bounded `crossbeam-channel`; the producer keeps its
//! own receiver handle so it can evict without taking a lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use super::AudioFrame;

/// Cloneable handle to a drop-oldest frame queue
#[derive(Clone)]
pub struct FrameQueue {
    tx: Sender<AudioFrame>,
    rx: Receiver<AudioFrame>,
    capacity: usize,
    dropped: Arc<AtomicU64>,
}

impl FrameQueue {
    /// Create a queue holding at most `capacity` frames (minimum 1)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            capacity,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Enqueue a frame, evicting the oldest one if the queue is full
    ///
    /// Never blocks. Returns `true` if a frame was evicted.
    pub fn push(&self, frame: AudioFrame) -> bool {
        let mut frame = frame;
        let mut evicted = false;
        loop {
            match self.tx.try_send(frame) {
                Ok(()) => return evicted,
                Err(TrySendError::Full(back)) => {
                    // The consumer may win the race for the head; only a frame
                    // taken here counts as dropped
                    if self.rx.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        evicted = true;
                    }
                    frame = back;
                }
                // Unreachable while this handle holds a receiver
                Err(TrySendError::Disconnected(_)) => return evicted,
            }
        }
    }

    /// Dequeue the oldest frame, waiting up to `timeout`
    ///
    /// `None` means no frame arrived in time; it is not an error. A timeout
    /// too large to form a deadline waits without one.
    #[must_use]
    pub fn pop(&self, timeout: Duration) -> Option<AudioFrame> {
        if timeout.is_zero() {
            return self.rx.try_recv().ok();
        }
        self.rx.recv_timeout(timeout).ok()
    }

    /// Discard every queued frame, returning how many were dropped
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }

    /// Frames currently buffered
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Upper bound on buffered frames
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of frames evicted because the consumer fell behind
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for FrameQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("dropped", &self.dropped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn frame(v: f32) -> AudioFrame {
        AudioFrame::new(vec![v; 4], 16_000)
    }

    #[test]
    fn test_fifo_order() {
        let queue = FrameQueue::new(4);
        queue.push(frame(0.1));
        queue.push(frame(0.2));

        assert_eq!(queue.pop(Duration::ZERO).unwrap().samples()[0], 0.1);
        assert_eq!(queue.pop(Duration::ZERO).unwrap().samples()[0], 0.2);
        assert!(queue.pop(Duration::ZERO).is_none());
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let queue = FrameQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        assert!(!queue.push(frame(0.1)));
        assert!(queue.push(frame(0.2)));
        assert_eq!(queue.pop(Duration::ZERO).unwrap().samples()[0], 0.2);
    }

    #[test]
    fn test_pop_times_out() {
        let queue = FrameQueue::new(2);
        let start = Instant::now();
        assert!(queue.pop(Duration::from_millis(30)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_pop_with_unbounded_timeout_returns_ready_frame() {
        let queue = FrameQueue::new(2);
        queue.push(frame(0.4));
        assert_eq!(queue.pop(Duration::MAX).unwrap().samples()[0], 0.4);
    }

    #[test]
    fn test_pop_wakes_on_push_from_other_thread() {
        let queue = FrameQueue::new(2);
        let producer = queue.clone();

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.push(frame(0.7));
        });

        let got = queue.pop(Duration::from_secs(5));
        handle.join().unwrap();
        assert_eq!(got.unwrap().samples()[0], 0.7);
    }

    #[test]
    fn test_push_does_not_wait_for_parked_consumer() {
        let queue = FrameQueue::new(4);
        let consumer = queue.clone();
        let handle = std::thread::spawn(move || consumer.pop(Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(20));

        let start = Instant::now();
        for i in 0..1000u16 {
            queue.push(frame(f32::from(i)));
        }
        assert!(start.elapsed() < Duration::from_secs(1));

        let taken = usize::from(handle.join().unwrap().is_some());
        // Every frame was either taken, evicted or is still buffered
        let dropped = usize::try_from(queue.dropped()).unwrap();
        assert_eq!(taken + dropped + queue.len(), 1000);
        assert!(queue.len() <= queue.capacity());
    }

    #[test]
    fn test_clear_reports_discarded() {
        let queue = FrameQueue::new(8);
        for _ in 0..3 {
            queue.push(frame(0.0));
        }
        assert_eq!(queue.clear(), 3);
        assert!(queue.is_empty());
    }
}
