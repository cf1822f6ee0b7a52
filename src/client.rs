//! The shared request/response core.
//!
//! A [`Client`] owns one [`Cache`], one [`AppManager`], one [`RequestManager`] and the
//! fetch and submit [`Dispatcher`]s, all sharing the same [`Adapter`]. Every observer
//! created from the same client shares this state; there are no globals.

use std::sync::Arc;

use tracing::debug;

use crate::adapter::Adapter;
use crate::app_manager::AppManager;
use crate::cache::Cache;
use crate::command::{Command, Method};
use crate::config::ClientConfig;
use crate::dispatcher::{Dispatcher, DispatcherKind};
use crate::request_manager::RequestManager;
use crate::response::{Response, ResponseDetails, ResponseEvent};

/// Options for [`Client::send`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Forces a dispatcher. By default `GET` goes through fetch and everything else
    /// through submit.
    pub dispatcher: Option<DispatcherKind>,
}

impl SendOptions {
    #[must_use]
    pub const fn with_dispatcher(mut self, dispatcher: DispatcherKind) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }
}

/// Owner of the cache, connectivity state, lifecycle events and both dispatchers.
///
/// Cloning is cheap; clones share everything.
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
/// let command = Command::new("/users/:id").with_param("id", 1);
/// mock.intercept(&command, Interceptor::ok(json!({ "id": 1 })));
///
/// let client = Client::new(mock);
/// let response = client.fetch(command).await;
/// assert_eq!(response.data, Some(json!({ "id": 1 })));
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    cache: Cache,
    app: AppManager,
    requests: RequestManager,
    fetch: Dispatcher,
    submit: Dispatcher,
}

impl Client {
    /// Creates a client with the default configuration.
    pub fn new(adapter: impl Adapter + 'static) -> Self {
        Self::with_config(adapter, ClientConfig::default())
    }

    pub fn with_config(adapter: impl Adapter + 'static, config: ClientConfig) -> Self {
        Self::from_parts(Arc::new(adapter), Cache::new(), config)
    }

    /// Creates a client around an existing cache, e.g. one with custom storage.
    pub fn from_parts(adapter: Arc<dyn Adapter>, cache: Cache, config: ClientConfig) -> Self {
        let app = AppManager::new();
        let requests = RequestManager::new();
        let fetch = Dispatcher::new(
            DispatcherKind::Fetch,
            config.fetch,
            Arc::clone(&adapter),
            cache.clone(),
            app.clone(),
            requests.clone(),
        );
        let submit = Dispatcher::new(
            DispatcherKind::Submit,
            config.submit,
            adapter,
            cache.clone(),
            app.clone(),
            requests.clone(),
        );
        Self {
            cache,
            app,
            requests,
            fetch,
            submit,
        }
    }

    pub const fn cache(&self) -> &Cache {
        &self.cache
    }

    pub const fn app_manager(&self) -> &AppManager {
        &self.app
    }

    pub const fn requests(&self) -> &RequestManager {
        &self.requests
    }

    pub const fn fetch_dispatcher(&self) -> &Dispatcher {
        &self.fetch
    }

    pub const fn submit_dispatcher(&self) -> &Dispatcher {
        &self.submit
    }

    pub const fn dispatcher(&self, kind: DispatcherKind) -> &Dispatcher {
        match kind {
            DispatcherKind::Fetch => &self.fetch,
            DispatcherKind::Submit => &self.submit,
        }
    }

    /// Dispatcher a command goes through when none is forced.
    pub fn default_dispatcher(command: &Command) -> DispatcherKind {
        if command.method() == Method::Get {
            DispatcherKind::Fetch
        } else {
            DispatcherKind::Submit
        }
    }

    /// Sends `command` and resolves with its final response.
    pub async fn send(&self, command: Command, options: SendOptions) -> Response {
        self.send_with_details(command, options).await.response
    }

    /// Sends `command` and resolves with its final response and details.
    pub async fn send_with_details(&self, command: Command, options: SendOptions) -> ResponseEvent {
        let kind = options
            .dispatcher
            .unwrap_or_else(|| Self::default_dispatcher(&command));
        let (request_id, receiver) = self.dispatcher(kind).add_and_wait(command);
        match receiver.await {
            Ok(event) => event,
            Err(_) => {
                debug!(%request_id, "request dropped without outcome");
                ResponseEvent {
                    request_id,
                    response: Response::aborted(),
                    details: ResponseDetails::canceled(),
                }
            }
        }
    }

    /// Sends `command` through the fetch dispatcher.
    pub async fn fetch(&self, command: Command) -> Response {
        self.send(command, SendOptions::default().with_dispatcher(DispatcherKind::Fetch))
            .await
    }

    /// Sends `command` through the submit dispatcher.
    pub async fn submit(&self, command: Command) -> Response {
        self.send(command, SendOptions::default().with_dispatcher(DispatcherKind::Submit))
            .await
    }

    /// Aborts every request, in both dispatchers, whose command has `abort_key`.
    pub fn abort_by_key(&self, abort_key: &str) -> usize {
        self.fetch.abort_by_key(abort_key) + self.submit.abort_by_key(abort_key)
    }

    /// Aborts everything and empties the cache.
    pub fn clear(&self) {
        self.fetch.clear();
        self.submit.clear();
        self.cache.clear();
    }
}
