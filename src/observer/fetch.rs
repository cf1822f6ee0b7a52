use std::fmt;
use std::sync::Arc;

use futures::stream::BoxStream;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{Binding, ObserverCallbacks, RequestState};
use crate::client::Client;
use crate::command::Command;
use crate::dispatcher::DispatcherKind;
use crate::events::EventHandle;
use crate::request_id::RequestId;
use crate::response::Response;

/// Options for [`FetchObserver::mount`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOptions {
    /// Never sends. The observer still follows the cache.
    pub disabled: bool,
    /// Fetches on mount even when fresh data is cached.
    pub revalidate_on_mount: bool,
    /// State to start from when nothing is cached.
    pub initial_data: Option<Response>,
}

impl FetchOptions {
    #[must_use]
    pub const fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    #[must_use]
    pub const fn with_revalidate_on_mount(mut self, revalidate_on_mount: bool) -> Self {
        self.revalidate_on_mount = revalidate_on_mount;
        self
    }

    #[must_use]
    pub fn with_initial_data(mut self, initial_data: Response) -> Self {
        self.initial_data = Some(initial_data);
        self
    }
}

/// Headless `useFetch`: keeps a [`RequestState`] in sync with one command's cache key.
///
/// On mount the observer fetches when nothing is cached, the cached entry is stale or
/// `revalidate_on_mount` is set. It refetches whenever the cache key is revalidated.
/// All fetches go through the fetch dispatcher and honor the command's deduplication.
///
/// # Example
///
/// ```
/// use hyperflow::prelude::*;
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mock = MockAdapter::new();
/// let command = Command::new("/users");
/// mock.intercept(&command, Interceptor::ok(json!(["alice"])));
///
/// let client = Client::new(mock);
/// let observer = FetchObserver::mount(&client, command, FetchOptions::default());
///
/// let mut state = observer.watch();
/// let state = state
///     .wait_for(|state| state.data.is_some())
///     .await
///     .expect("observer alive");
/// assert_eq!(state.data, Some(json!(["alice"])));
/// # }
/// ```
pub struct FetchObserver {
    binding: Arc<Binding>,
    options: FetchOptions,
    _revalidation: EventHandle,
}

impl fmt::Debug for FetchObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchObserver")
            .field("cache_key", &self.binding.command.cache_key())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl FetchObserver {
    /// Binds `command` to `client` and fetches if needed.
    ///
    /// Must be called within a Tokio runtime.
    pub fn mount(client: &Client, command: Command, options: FetchOptions) -> Self {
        let cached = client.cache().get(&command.cache_key());
        let needs_fetch = options.revalidate_on_mount
            || cached
                .as_ref()
                .is_none_or(|entry| entry.is_stale(command.stale_time()));

        let binding = Binding::new(
            client,
            command,
            DispatcherKind::Fetch,
            options.initial_data.clone(),
        );

        let revalidation = {
            let weak = Arc::downgrade(&binding);
            let disabled = options.disabled;
            client
                .cache()
                .on_revalidate(binding.command.cache_key(), move |key| {
                    if disabled {
                        return;
                    }
                    if let Some(binding) = weak.upgrade() {
                        debug!(cache_key = %key, "revalidation requested");
                        fetch(&binding);
                    }
                })
        };

        let observer = Self {
            binding,
            options,
            _revalidation: revalidation,
        };
        if needs_fetch && !observer.options.disabled {
            fetch(&observer.binding);
        }
        observer
    }

    /// Fetches again. Returns `None` when the observer is disabled.
    ///
    /// Must be called within a Tokio runtime.
    pub fn refetch(&self) -> Option<RequestId> {
        if self.options.disabled {
            warn!(cache_key = %self.binding.command.cache_key(), "cannot refetch, observer is disabled");
            return None;
        }
        Some(fetch(&self.binding))
    }

    /// Marks the cache key stale and makes every observer of it refetch.
    pub fn revalidate(&self) {
        self.binding
            .client
            .cache()
            .revalidate(&self.binding.command.cache_key());
    }

    /// Aborts every request sharing the command's abort key.
    pub fn abort(&self) -> usize {
        self.binding
            .client
            .abort_by_key(&self.binding.command.abort_key())
    }

    pub fn state(&self) -> RequestState {
        self.binding.state.borrow().clone()
    }

    /// A receiver that observes every state change.
    pub fn watch(&self) -> watch::Receiver<RequestState> {
        self.binding.state.subscribe()
    }

    /// Streams the state, starting with the current one.
    pub fn stream(&self) -> BoxStream<'static, RequestState> {
        self.binding.stream()
    }

    pub fn callbacks(&self) -> &ObserverCallbacks {
        &self.binding.callbacks
    }

    pub fn command(&self) -> &Command {
        &self.binding.command
    }
}

/// Enqueues the bound command and settles the binding once the outcome arrives.
fn fetch(binding: &Arc<Binding>) -> RequestId {
    let enqueued = binding.dispatch(binding.command.clone());
    let request_id = enqueued.request_id.clone();
    let weak = Arc::downgrade(binding);
    let cached = binding.command.cache();

    tokio::spawn(async move {
        let Ok(event) = enqueued.receiver.await else {
            return;
        };
        if let Some(binding) = weak.upgrade() {
            binding.settled(cached, &event);
        }
    });
    request_id
}
