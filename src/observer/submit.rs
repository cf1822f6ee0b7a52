use std::fmt;
use std::sync::Arc;

use futures::stream::BoxStream;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{Binding, ObserverCallbacks, RequestState};
use crate::client::Client;
use crate::command::Command;
use crate::dispatcher::DispatcherKind;
use crate::response::{NO_STATUS, RequestError, Response};

/// Options for [`SubmitObserver::new`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Rejects every submit with a [`RequestError::Disabled`] response.
    pub disabled: bool,
}

impl SubmitOptions {
    #[must_use]
    pub const fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }
}

/// Headless `useSubmit`: sends a command through the submit dispatcher on demand.
///
/// The observer follows the cache key and loading state of its command like
/// [`FetchObserver`](super::FetchObserver) does, but never sends on its own.
pub struct SubmitObserver {
    binding: Arc<Binding>,
    options: SubmitOptions,
}

impl fmt::Debug for SubmitObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmitObserver")
            .field("queue_key", &self.binding.command.queue_key())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl SubmitObserver {
    pub fn new(client: &Client, command: Command, options: SubmitOptions) -> Self {
        Self {
            binding: Binding::new(client, command, DispatcherKind::Submit, None),
            options,
        }
    }

    /// Sends the bound command and resolves with its final response.
    pub async fn submit(&self) -> Response {
        self.submit_with(|command| command).await
    }

    /// Sends a modified copy of the bound command, e.g. with a payload.
    ///
    /// Listeners stay bound to the keys of the unmodified command.
    pub async fn submit_with(&self, modify: impl FnOnce(Command) -> Command) -> Response {
        if self.options.disabled {
            warn!(queue_key = %self.binding.command.queue_key(), "cannot submit, observer is disabled");
            return Response::failure(
                NO_STATUS,
                RequestError::Disabled("option 'disabled' is enabled".to_string()),
            );
        }

        let command = modify(self.binding.command.clone());
        let cached = command.cache();
        let enqueued = self.binding.dispatch(command);
        debug!(request_id = %enqueued.request_id, "submitting");

        match enqueued.receiver.await {
            Ok(event) => {
                self.binding.settled(cached, &event);
                event.response
            }
            Err(_) => Response::aborted(),
        }
    }

    /// Aborts every request sharing the command's abort key.
    pub fn abort(&self) -> usize {
        self.binding
            .client
            .abort_by_key(&self.binding.command.abort_key())
    }

    /// Revalidates `cache_key`, making its fetch observers refetch.
    pub fn revalidate(&self, cache_key: &str) {
        self.binding.client.cache().revalidate(cache_key);
    }

    pub fn state(&self) -> RequestState {
        self.binding.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<RequestState> {
        self.binding.state.subscribe()
    }

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Interceptor, MockAdapter};
    use crate::command::Method;
    use serde_json::json;

    fn post() -> Command {
        Command::new("/users").with_method(Method::Post)
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit() {
        let mock = MockAdapter::new();
        mock.intercept(&post(), Interceptor::ok(json!({ "id": 1 })));
        let client = Client::new(mock.clone());
        let observer = SubmitObserver::new(&client, post(), SubmitOptions::default());

        let response = observer
            .submit_with(|command| command.with_data(json!({ "name": "a" })))
            .await;

        assert_eq!(response.data, Some(json!({ "id": 1 })));
        assert_eq!(observer.state().data, Some(json!({ "id": 1 })));
        assert!(!observer.state().is_loading);
        assert_eq!(mock.calls(&post()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_submit() {
        let mock = MockAdapter::new();
        let client = Client::new(mock.clone());
        let observer = SubmitObserver::new(
            &client,
            post(),
            SubmitOptions::default().with_disabled(true),
        );

        let response = observer.submit().await;
        assert_eq!(response.status, NO_STATUS);
        assert!(matches!(response.error, Some(RequestError::Disabled(_))));
        assert_eq!(mock.calls(&post()), 0);
    }
}
