//! Queue storage
//!
//! A `Queue` is a FIFO of encoded frames. Rolled back frames are pushed back to
//! the head so a single consumer keeps seeing messages in publish order.
//!
//! Receivers park on a `Notify` and are woken by every enqueue and by `close`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

#[derive(Debug)]
pub struct Queue {
    pub name: String,
    frames: Mutex<VecDeque<Vec<u8>>>,
    new_frame_notify: Notify,
    closed: AtomicBool,
}

impl Queue {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            frames: Mutex::new(VecDeque::new()),
            new_frame_notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Append a frame at the tail.
    pub async fn push_back(&self, frame: Vec<u8>) {
        self.frames.lock().await.push_back(frame);
        self.new_frame_notify.notify_waiters();
    }

    /// Put a frame back at the head, ahead of everything published after it.
    pub async fn push_front(&self, frame: Vec<u8>) {
        self.frames.lock().await.push_front(frame);
        self.new_frame_notify.notify_waiters();
    }

    /// Take the head frame without waiting.
    pub async fn try_pop(&self) -> Option<Vec<u8>> {
        self.frames.lock().await.pop_front()
    }

    /// Take the head frame, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` on timeout or once the queue is closed.
    pub async fn pop(&self, timeout: Duration) -> Option<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.new_frame_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_closed() {
                return None;
            }
            if let Some(frame) = self.try_pop().await {
                return Some(frame);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.frames.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every frame and wake all parked receivers.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.frames.lock().await.clear();
        self.new_frame_notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
