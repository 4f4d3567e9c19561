//! Event merge queue.
//!
//! Pointer and keyboard producers push into cloned [`EventSink`]s; the single
//! consumer pops from the [`EventQueue`] in arrival order. This is the only
//! synchronisation point between producers and the session recorder.

use crate::collector::types::InputEvent;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Producer handle. Cheap to clone, safe to use from any thread.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: Sender<InputEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventSink {
    /// Push an event. Never blocks.
    ///
    /// Returns `false` when the queue is bounded and full; the event is
    /// dropped and counted.
    pub fn push(&self, event: InputEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

/// Consumer side of the merge queue.
#[derive(Debug)]
pub struct EventQueue {
    sender: Sender<InputEvent>,
    receiver: Receiver<InputEvent>,
    dropped: Arc<AtomicU64>,
    capacity: Option<usize>,
}

impl EventQueue {
    /// Create a queue. `None` means unbounded.
    pub fn new(capacity: Option<usize>) -> Self {
        let (sender, receiver) = match capacity {
            Some(cap) => bounded(cap.max(1)),
            None => unbounded(),
        };

        Self {
            sender,
            receiver,
            dropped: Arc::new(AtomicU64::new(0)),
            capacity,
        }
    }

    /// Get a producer handle.
    pub fn sink(&self) -> EventSink {
        EventSink {
            sender: self.sender.clone(),
            dropped: self.dropped.clone(),
        }
    }

    /// Push from the consumer side (mainly useful for tests and replay).
    pub fn push(&self, event: InputEvent) -> bool {
        self.sink().push(event)
    }

    /// Wait up to `timeout` for the next event.
    ///
    /// Returns `None` when nothing arrived in time.
    pub fn pop(&self, timeout: Duration) -> Option<InputEvent> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Take the next event if one is ready.
    pub fn try_pop(&self) -> Option<InputEvent> {
        self.receiver.try_recv().ok()
    }

    /// Discard everything currently queued. Returns how many events were dropped.
    pub fn drain(&self) -> usize {
        let mut count = 0;
        while self.receiver.try_recv().is_ok() {
            count += 1;
        }
        count
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Events rejected because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::{KeyEvent, PointerEvent};
    use std::thread;

    #[test]
    fn test_pop_times_out_without_error() {
        let queue = EventQueue::new(None);
        assert!(queue.pop(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_fifo_across_producers() {
        let queue = EventQueue::new(None);
        let mouse = queue.sink();
        let keys = queue.sink();

        mouse.push(InputEvent::Pointer(PointerEvent::left_at(1)));
        keys.push(InputEvent::Keyboard(KeyEvent::at(2, "a")));
        mouse.push(InputEvent::Pointer(PointerEvent::left_at(3)));

        let order: Vec<i64> = std::iter::from_fn(|| queue.try_pop())
            .map(|e| e.timestamp_ms())
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_concurrent_producers_lose_nothing_when_unbounded() {
        let queue = EventQueue::new(None);
        let handles: Vec<_> = (0..4)
            .map(|p| {
                let sink = queue.sink();
                thread::spawn(move || {
                    for i in 0..250 {
                        sink.push(InputEvent::Keyboard(KeyEvent::at(p * 1000 + i, "x")));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(queue.len(), 1000);
        assert_eq!(queue.dropped_count(), 0);

        // Per-producer order is preserved in the merged stream.
        let mut last_seen = [-1i64; 4];
        while let Some(event) = queue.try_pop() {
            let ts = event.timestamp_ms();
            let producer = (ts / 1000) as usize;
            assert!(ts > last_seen[producer]);
            last_seen[producer] = ts;
        }
    }

    #[test]
    fn test_bounded_queue_drops_newest_when_full() {
        let queue = EventQueue::new(Some(2));
        assert!(queue.push(InputEvent::Keyboard(KeyEvent::at(1, "a"))));
        assert!(queue.push(InputEvent::Keyboard(KeyEvent::at(2, "b"))));
        assert!(!queue.push(InputEvent::Keyboard(KeyEvent::at(3, "c"))));

        assert_eq!(queue.dropped_count(), 1);
        assert_eq!(queue.try_pop().map(|e| e.timestamp_ms()), Some(1));
        assert_eq!(queue.try_pop().map(|e| e.timestamp_ms()), Some(2));
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn test_drain() {
        let queue = EventQueue::new(None);
        queue.push(InputEvent::Pointer(PointerEvent::left_at(1)));
        queue.push(InputEvent::Pointer(PointerEvent::left_at(2)));
        assert_eq!(queue.drain(), 2);
        assert!(queue.is_empty());
    }
}
