//! Bounded per-subscriber outbound queue implementing the backpressure
//! policy of §4.7: when full, drop awareness frames first; if still full,
//! signal the caller to disconnect the subscriber (close 4008).

use super::wire::Frame;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

/// Default bound on a subscriber's pending outbound frames (§4.7).
pub const DEFAULT_CAPACITY: usize = 256;

fn is_awareness(frame: &Frame) -> bool {
    matches!(frame, Frame::AwarenessSnapshot(_) | Frame::AwarenessUpdate(_))
}

/// Returned by `push` when the queue is full of non-awareness frames and
/// cannot make room — the caller must disconnect the subscriber.
pub struct QueueFull;

/// The close code and reason a closed queue hands back to its writer, so a
/// disconnect for a specific cause (backpressure, room destruction, ...)
/// survives being carried through `pop()` returning `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: &'static str,
}

const DEFAULT_CLOSE: CloseReason = CloseReason {
    code: 1000,
    reason: "room closed",
};

pub struct OutboundQueue {
    capacity: usize,
    inner: Mutex<VecDeque<Frame>>,
    notify: Notify,
    closed: Mutex<Option<CloseReason>>,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            closed: Mutex::new(None),
        }
    }

    /// Enqueues a frame, applying the drop-awareness-first policy when the
    /// queue is at capacity. Returns `Err(QueueFull)` when no awareness
    /// frame could be evicted to make room.
    pub fn push(&self, frame: Frame) -> Result<(), QueueFull> {
        let mut queue = self.inner.lock().unwrap();
        if queue.len() >= self.capacity {
            if let Some(pos) = queue.iter().position(is_awareness) {
                queue.remove(pos);
            } else {
                return Err(QueueFull);
            }
        }
        queue.push_back(frame);
        drop(queue);
        self.notify.notify_one();
        Ok(())
    }

    /// Waits for and removes the next frame, or returns `None` once the
    /// queue has been closed and drained.
    pub async fn pop(&self) -> Option<Frame> {
        loop {
            {
                let mut queue = self.inner.lock().unwrap();
                if let Some(frame) = queue.pop_front() {
                    return Some(frame);
                }
                if self.closed.lock().unwrap().is_some() {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// The close code/reason to hand the writer once `pop()` has returned
    /// `None`, or the default normal-closure reason if none was set.
    pub fn close_reason(&self) -> CloseReason {
        self.closed.lock().unwrap().unwrap_or(DEFAULT_CLOSE)
    }

    /// Closes the queue with the default normal-closure reason (1000).
    pub fn close(&self) {
        self.close_with(DEFAULT_CLOSE.code, DEFAULT_CLOSE.reason);
    }

    /// Closes the queue, recording a specific close code/reason for the
    /// writer to send once the queue drains (§4.7 backpressure policy,
    /// §6.5 room-destroyed close).
    pub fn close_with(&self, code: u16, reason: &'static str) {
        let mut closed = self.closed.lock().unwrap();
        if closed.is_none() {
            *closed = Some(CloseReason { code, reason });
        }
        drop(closed);
        self.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn awareness_frames_are_dropped_before_disconnect() {
        let queue = OutboundQueue::new(2);
        queue.push(Frame::AwarenessUpdate(vec![1])).unwrap();
        queue.push(Frame::DocUpdate(vec![2])).unwrap();
        // Queue is full; pushing a doc update must evict the awareness
        // frame rather than fail.
        assert!(queue.push(Frame::DocUpdate(vec![3])).is_ok());
        let mut seen = Vec::new();
        let mut q = queue.inner.lock().unwrap();
        while let Some(f) = q.pop_front() {
            seen.push(f);
        }
        assert_eq!(seen, vec![Frame::DocUpdate(vec![2]), Frame::DocUpdate(vec![3])]);
    }

    #[test]
    fn full_of_doc_updates_refuses_and_signals_disconnect() {
        let queue = OutboundQueue::new(1);
        queue.push(Frame::DocUpdate(vec![1])).unwrap();
        assert!(queue.push(Frame::DocUpdate(vec![2])).is_err());
    }

    #[tokio::test]
    async fn pop_returns_none_after_close_when_drained() {
        let queue = OutboundQueue::new(4);
        queue.close();
        assert!(queue.pop().await.is_none());
    }

    #[tokio::test]
    async fn pop_yields_pushed_frame() {
        let queue = OutboundQueue::new(4);
        queue.push(Frame::Ping).unwrap();
        assert_eq!(queue.pop().await, Some(Frame::Ping));
    }
}
