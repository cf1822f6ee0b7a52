//! Connectivity state shared by the dispatchers.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::info;

use crate::events::{Emitter, EventHandle};

const ONLINE: &str = "online";

/// Tracks whether the client is online.
///
/// Dispatchers hold offline-tolerant requests while the client is offline and resume
/// them as soon as [`AppManager::set_online`] reports connectivity again.
#[derive(Debug, Clone)]
pub struct AppManager {
    online: Arc<watch::Sender<bool>>,
    changes: Emitter<bool>,
}

impl Default for AppManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AppManager {
    /// Creates a manager that starts online.
    #[must_use]
    pub fn new() -> Self {
        let (online, _) = watch::channel(true);
        Self {
            online: Arc::new(online),
            changes: Emitter::new(),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    /// Updates connectivity. Listeners are only notified on actual changes.
    pub fn set_online(&self, online: bool) {
        let changed = self.online.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(online, "connectivity changed");
            self.changes.emit(ONLINE, &online);
        }
    }

    /// Registers `callback` for connectivity changes.
    pub fn on_online_change<F>(&self, callback: F) -> EventHandle
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.changes.on(ONLINE, callback)
    }

    /// Resolves once the client is online. Returns immediately if it already is.
    pub async fn wait_online(&self) {
        let mut rx = self.online.subscribe();
        let _ = rx.wait_for(|online| *online).await;
    }

    /// Streams connectivity, starting with the current value.
    pub fn watch(&self) -> BoxStream<'static, bool> {
        WatchStream::new(self.online.subscribe()).boxed()
    }
}
