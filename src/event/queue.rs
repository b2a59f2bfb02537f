//! Mailbox and wake signal shared between the transport task and the scheduler
//!
//! One side pushes events through an [`EventSender`]; the scheduler owns the
//! [`EventQueue`] and follows a strict `wait` → `check` → `pop`-until-empty
//! discipline. The wake flag is binary: pushing twice before a `check` yields
//! a single `true`.

use super::Event;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

struct Shared<E> {
    pending: Mutex<VecDeque<Event<E>>>,
    signal: AtomicBool,
    notify: Notify,
}

impl<E> Shared<E> {
    fn pending(&self) -> MutexGuard<'_, VecDeque<Event<E>>> {
        // A panic while holding the lock cannot leave the deque half-updated
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Consumer side of the event mailbox, owned by the scheduler
pub struct EventQueue<E> {
    shared: Arc<Shared<E>>,
}

/// Producer handle onto an [`EventQueue`]
pub struct EventSender<E> {
    shared: Arc<Shared<E>>,
}

impl<E> Clone for EventSender<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                pending: Mutex::new(VecDeque::new()),
                signal: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Create a producer handle for this queue
    pub fn sender(&self) -> EventSender<E> {
        EventSender {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Block for at most `timeout`, returning early once the wake signal is set.
    ///
    /// The signal is left untouched; call [`check`](Self::check) afterwards.
    pub async fn wait(&self, timeout: Duration) {
        let started = Instant::now();
        let deadline = started + timeout;
        debug!(sleep_secs = timeout.as_secs_f64(), "sleeping");

        loop {
            let notified = self.shared.notify.notified();
            if self.shared.signal.load(Ordering::Acquire) {
                break;
            }
            // A stale permit left by an earlier push wakes us without the flag
            // being set; loop and re-check instead of reporting a wake.
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                break;
            }
        }

        debug!(
            slept_secs = started.elapsed().as_secs_f64(),
            "woke up"
        );
    }

    /// Test-and-clear the wake signal. Returns true iff it was set.
    pub fn check(&self) -> bool {
        self.shared.signal.swap(false, Ordering::AcqRel)
    }

    /// Remove and return the oldest pending event. Never blocks.
    pub fn pop(&self) -> Option<Event<E>> {
        self.shared.pending().pop_front()
    }

    pub fn len(&self) -> usize {
        self.shared.pending().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E> EventSender<E> {
    /// Append an event and raise the wake signal
    pub fn push(&self, event: Event<E>) {
        debug!(event = event.kind(), "queuing event");
        self.shared.pending().push_back(event);
        self.shared.signal.store(true, Ordering::Release);
        self.shared.notify.notify_one();
    }

    /// Append an application-defined event
    pub fn send(&self, event: E) {
        self.push(Event::App(event));
    }
}
