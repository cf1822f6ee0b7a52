//! Headless request bindings.
//!
//! Observers are the view-independent half of the `useFetch`/`useSubmit` hooks: they
//! subscribe to the cache, the dispatcher loading events and the request lifecycle of a
//! [`Client`], and expose a reactive [`RequestState`] snapshot plus user callbacks.
//! Every observer bound to the same cache key converges on the same state.
//!
//! Dropping an observer removes all of its listeners.

mod callbacks;
mod fetch;
mod state;
mod submit;

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use futures::StreamExt;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::trace;

use crate::client::Client;
use crate::command::Command;
use crate::dispatcher::{DispatcherKind, Enqueued};
use crate::events::EventHandle;
use crate::request_id::RequestId;
use crate::response::{Response, ResponseDetails, ResponseEvent};

pub use callbacks::{CallbackSlot, LifecycleCallback, ObserverCallbacks, ProgressCallback, ResponseCallback};
pub use fetch::{FetchObserver, FetchOptions};
pub use state::RequestState;
pub use submit::{SubmitObserver, SubmitOptions};

/// State and listeners shared by both observer kinds.
struct Binding {
    client: Client,
    command: Command,
    kind: DispatcherKind,
    state: watch::Sender<RequestState>,
    callbacks: ObserverCallbacks,
    data_listeners: Mutex<Vec<EventHandle>>,
    lifecycle_listeners: Mutex<HashMap<RequestId, Vec<EventHandle>>>,
}

impl Binding {
    fn new(client: &Client, command: Command, kind: DispatcherKind, initial: Option<Response>) -> Arc<Self> {
        let is_loading = client.dispatcher(kind).is_loading(&command.queue_key());
        let state = match client.cache().get(&command.cache_key()) {
            Some(entry) => RequestState::from_entry(&entry, is_loading),
            None => initial.map_or_else(
                || RequestState {
                    is_loading,
                    ..RequestState::default()
                },
                |response| RequestState::from_response(&response, is_loading),
            ),
        };
        let (state, _) = watch::channel(state);

        let binding = Arc::new(Self {
            client: client.clone(),
            command,
            kind,
            state,
            callbacks: ObserverCallbacks::default(),
            data_listeners: Mutex::new(Vec::new()),
            lifecycle_listeners: Mutex::new(HashMap::new()),
        });
        binding.add_data_listeners();
        binding
    }

    /// Follows loading, cached data and aborts of the bound command.
    fn add_data_listeners(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let dispatcher = self.client.dispatcher(self.kind);

        let loading = dispatcher.on_loading(self.command.queue_key(), {
            let weak = weak.clone();
            move |event| {
                if let Some(binding) = weak.upgrade() {
                    binding
                        .state
                        .send_modify(|state| state.is_loading = event.is_loading);
                }
            }
        });

        let data = self.client.cache().subscribe(self.command.cache_key(), {
            let weak = weak.clone();
            move |entry| {
                if let Some(binding) = weak.upgrade() {
                    binding.state.send_modify(|state| state.apply_entry(entry));
                }
            }
        });

        let abort = self
            .client
            .requests()
            .on_abort(self.command.abort_key(), move |event| {
                if let Some(binding) = weak.upgrade() {
                    trace!(request_id = %event.request_id, "observed abort");
                    binding.remove_lifecycle_listeners(&event.request_id);
                    binding
                        .callbacks
                        .dispatch(&Response::aborted(), &ResponseDetails::canceled());
                }
            });

        *self.data_listeners.lock() = vec![loading, data, abort];
    }

    /// Forwards lifecycle events of `request_id` to the user callbacks.
    fn add_lifecycle_listeners(self: &Arc<Self>, request_id: &RequestId) {
        let requests = self.client.requests();
        let weak = Arc::downgrade(self);
        let handles = vec![
            requests.on_request_start(request_id, forward(&weak, ObserverCallbacks::request_started)),
            requests.on_response_start(request_id, forward(&weak, ObserverCallbacks::response_started)),
            requests.on_upload_progress(request_id, forward(&weak, ObserverCallbacks::upload_progressed)),
            requests.on_download_progress(
                request_id,
                forward(&weak, ObserverCallbacks::download_progressed),
            ),
        ];
        self.lifecycle_listeners
            .lock()
            .entry(request_id.clone())
            .or_default()
            .extend(handles);
    }

    fn remove_lifecycle_listeners(&self, request_id: &RequestId) {
        let removed = self.lifecycle_listeners.lock().remove(request_id);
        drop(removed);
    }

    /// Enqueues `command`, following its lifecycle under the id it ends up with.
    fn dispatch(self: &Arc<Self>, command: Command) -> Enqueued {
        let request_id = RequestId::new();
        self.add_lifecycle_listeners(&request_id);
        let enqueued = self
            .client
            .dispatcher(self.kind)
            .enqueue(command, request_id.clone());
        if enqueued.request_id != request_id {
            self.remove_lifecycle_listeners(&request_id);
            self.add_lifecycle_listeners(&enqueued.request_id);
        }
        enqueued
    }

    /// Applies the final outcome of a request dispatched by this observer.
    ///
    /// Aborts are reported through the abort listener instead.
    fn settled(&self, cached: bool, event: &ResponseEvent) {
        self.remove_lifecycle_listeners(&event.request_id);
        if event.details.is_canceled {
            return;
        }
        if !cached || event.details.is_offline {
            self.state
                .send_modify(|state| state.apply_response(&event.response, &event.details));
        }
        self.callbacks.dispatch(&event.response, &event.details);
    }

    fn stream(&self) -> BoxStream<'static, RequestState> {
        WatchStream::new(self.state.subscribe()).boxed()
    }
}

/// Builds a listener that forwards events to the callbacks of a still-alive binding.
fn forward<T>(
    weak: &Weak<Binding>,
    f: fn(&ObserverCallbacks, &T),
) -> impl Fn(&T) + Send + Sync + 'static
where
    T: 'static,
{
    let weak = weak.clone();
    move |event| {
        if let Some(binding) = weak.upgrade() {
            f(&binding.callbacks, event);
        }
    }
}
