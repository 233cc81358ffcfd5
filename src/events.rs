//! Lifecycle event streams.
//!
//! An [`EventStream`] is a multicast channel with synchronous fan-out:
//! emitting a value calls every subscriber on the emitting thread, in
//! subscription order, before `emit` returns. There is no replay; a late
//! subscriber only sees values emitted after it subscribed.
//!
//! A stream can be completed once. After that nothing is emitted anymore,
//! existing subscribers are dropped and new subscriptions are rejected with
//! [`RenderError::StreamCompleted`].
//!
//! Async consumers can use [`EventStream::listen`], which hands out a
//! `tokio::sync::broadcast` receiver. That receiver is buffered, and it
//! reports `Closed` once the stream completes.

use crate::errors::RenderError;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::broadcast;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct StreamState<T> {
    next_id: u64,
    subscribers: Vec<(u64, Callback<T>)>,
    /// Bridge for async listeners, dropped on completion
    tx: Option<broadcast::Sender<T>>,
}

pub struct EventStream<T> {
    state: Arc<Mutex<StreamState<T>>>,
}

impl<T> std::fmt::Debug for EventStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("EventStream")
            .field("subscribers", &state.subscribers.len())
            .field("completed", &state.tx.is_none())
            .finish()
    }
}

impl<T: Clone + Send + 'static> EventStream<T> {
    /// Creates an open stream. `capacity` is the buffer size of async listeners.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            state: Arc::new(Mutex::new(StreamState {
                next_id: 0,
                subscribers: Vec::new(),
                tx: Some(tx),
            })),
        }
    }

    /// Registers a callback. The callback stays registered as long as the returned
    /// [`Subscription`] is alive.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Result<Subscription, RenderError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.tx.is_none() {
            return Err(RenderError::StreamCompleted);
        }

        state.next_id += 1;
        let id = state.next_id;
        state.subscribers.push((id, Arc::new(callback)));

        let weak: Weak<Mutex<StreamState<T>>> = Arc::downgrade(&self.state);
        Ok(Subscription {
            cancel: Some(Box::new(move || {
                if let Some(state) = weak.upgrade() {
                    state
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .subscribers
                        .retain(|(sid, _)| *sid != id);
                }
            })),
        })
    }

    /// Returns a buffered async receiver for values emitted from now on.
    pub fn listen(&self) -> Result<broadcast::Receiver<T>, RenderError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.tx.as_ref().map(|tx| tx.subscribe()).ok_or(RenderError::StreamCompleted)
    }

    /// Delivers `value` to every subscriber. Does nothing on a completed stream.
    pub(crate) fn emit(&self, value: T) {
        // Snapshot under the lock, call without it: subscribers may subscribe,
        // unsubscribe or emit again from inside their callback.
        let (subscribers, tx) = {
            let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(tx) = state.tx.clone() else {
                return;
            };
            let subscribers: Vec<Callback<T>> = state.subscribers.iter().map(|(_, cb)| cb.clone()).collect();
            (subscribers, tx)
        };

        log::trace!("Emitting event to {} subscriber(s)", subscribers.len());
        for callback in subscribers {
            callback(&value);
        }

        // send() fails only when there are no async listeners. That's fine.
        let _ = tx.send(value);
    }

    /// Terminates the stream. Idempotent.
    pub(crate) fn complete(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.tx = None;
        state.subscribers.clear();
    }

    pub fn is_completed(&self) -> bool {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).tx.is_none()
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).subscribers.len()
    }
}

/// Keeps a callback registered on an [`EventStream`]. Dropping it unsubscribes.
#[must_use = "the callback is unsubscribed as soon as the subscription is dropped"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("active", &self.cancel.is_some()).finish()
    }
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}
