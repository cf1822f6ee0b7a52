//! Keyed publish/subscribe shared by the cache, the dispatchers and the request manager.
//!
//! Listeners are registered under a string key (a cache key, queue key, request id or
//! abort key) and are invoked in registration order. Each emission works on a snapshot
//! of the listener list, so a listener may unsubscribe itself, or others, while being
//! notified.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use parking_lot::Mutex;
use tokio::sync::mpsc;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Inner<T> {
    listeners: Mutex<HashMap<String, Vec<(u64, Callback<T>)>>>,
    next_id: AtomicU64,
}

impl<T> Inner<T> {
    fn remove(&self, key: &str, id: u64) {
        let mut listeners = self.listeners.lock();
        if let Some(list) = listeners.get_mut(key) {
            list.retain(|(listener_id, _)| *listener_id != id);
            if list.is_empty() {
                listeners.remove(key);
            }
        }
    }
}

/// A keyed event emitter.
pub struct Emitter<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("keys", &self.inner.listeners.lock().len())
            .finish()
    }
}

impl<T: 'static> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Emitter<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                listeners: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Registers `callback` for `key`. The listener lives as long as the returned handle.
    pub fn on<F>(&self, key: impl Into<String>, callback: F) -> EventHandle
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let key = key.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .entry(key.clone())
            .or_default()
            .push((id, Arc::new(callback)));

        let weak: Weak<Inner<T>> = Arc::downgrade(&self.inner);
        EventHandle::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove(&key, id);
            }
        })
    }

    /// Invokes every listener registered for `key`.
    pub fn emit(&self, key: &str, value: &T) {
        let snapshot: Vec<Callback<T>> = match self.inner.listeners.lock().get(key) {
            Some(list) => list.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
            None => return,
        };

        for callback in snapshot {
            callback(value);
        }
    }

    /// Number of listeners currently registered for `key`.
    pub fn listener_count(&self, key: &str) -> usize {
        self.inner.listeners.lock().get(key).map_or(0, Vec::len)
    }

    /// Drops every listener. Outstanding handles become no-ops.
    pub fn clear(&self) {
        self.inner.listeners.lock().clear();
    }
}

impl<T: Clone + Send + 'static> Emitter<T> {
    /// Streams every value emitted for `key` from now on.
    ///
    /// The listener is removed when the stream is dropped.
    pub fn stream(&self, key: impl Into<String>) -> BoxStream<'static, T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.on(key, move |value: &T| {
            let _ = tx.send(value.clone());
        });

        stream::unfold((rx, handle), |(mut rx, handle)| async move {
            let value = rx.recv().await?;
            Some((value, (rx, handle)))
        })
        .boxed()
    }
}

/// Handle for a registered listener.
///
/// Dropping the handle, or calling [`EventHandle::unsubscribe`], removes the listener.
/// Unsubscribing more than once is a no-op.
#[must_use = "dropping the handle removes the listener"]
pub struct EventHandle {
    unsubscribe: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl EventHandle {
    fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unsubscribe: Mutex::new(Some(Box::new(unsubscribe))),
        }
    }

    /// Removes the listener.
    pub fn unsubscribe(&self) {
        let unsubscribe = self.unsubscribe.lock().take();
        if let Some(unsubscribe) = unsubscribe {
            unsubscribe();
        }
    }

    /// Returns `true` until the handle has been unsubscribed.
    pub fn is_active(&self) -> bool {
        self.unsubscribe.lock().is_some()
    }
}

impl fmt::Debug for EventHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for EventHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
