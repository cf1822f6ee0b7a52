//! Mock adapter for testing.
//!
//! [`MockAdapter`] answers requests from interceptors registered per method and endpoint,
//! enabling deterministic tests without real I/O. Interceptors can delay their answer,
//! which together with `#[tokio::test(start_paused = true)]` makes timing-dependent
//! behavior (deduplication windows, retries, aborts) reproducible.
//!
//! # Basic Usage
//!
//! ```
//! use hyperflow::adapter::{Interceptor, MockAdapter};
//! use hyperflow::command::Command;
//! use serde_json::json;
//!
//! let mock = MockAdapter::new();
//! let command = Command::new("/users/:id").with_param("id", 1);
//!
//! mock.intercept(&command, Interceptor::ok(json!({ "id": 1 })));
//! // Fail the next call only, then fall back to the interceptor above.
//! mock.intercept_once(&command, Interceptor::status(500));
//! ```
//!
//! Requests without a matching interceptor fail with a network error.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::trace;

use super::{Adapter, AdapterRequest};
use crate::command::Command;
use crate::response::{NO_STATUS, Response};

/// A canned answer for matching requests.
#[derive(Debug, Clone, PartialEq)]
pub struct Interceptor {
    pub status: u16,
    pub body: Value,
    pub delay: Duration,
}

impl Interceptor {
    /// A `200` answer with `body`.
    #[must_use]
    pub const fn ok(body: Value) -> Self {
        Self {
            status: 200,
            body,
            delay: Duration::ZERO,
        }
    }

    /// An answer with `status` and an empty body.
    ///
    /// Status `0` simulates a transport failure.
    #[must_use]
    pub const fn status(status: u16) -> Self {
        Self {
            status,
            body: Value::Null,
            delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn into_response(self) -> Response {
        match self.status {
            NO_STATUS => Response::network_error("connection failed"),
            200..=299 => Response::success(self.status, self.body),
            status => {
                let body = (!self.body.is_null()).then_some(self.body);
                Response::http_error(status, body)
            }
        }
    }
}

#[derive(Debug, Default)]
struct Route {
    once: VecDeque<Interceptor>,
    persistent: Option<Interceptor>,
    calls: usize,
}

/// An [`Adapter`] answering from registered interceptors.
///
/// Cloning shares the interceptors, so the same mock can be handed to a client and kept
/// by the test to change answers between requests.
#[derive(Debug, Clone, Default)]
pub struct MockAdapter {
    routes: Arc<Mutex<HashMap<String, Route>>>,
}

impl MockAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn route_key(command: &Command) -> String {
        format!("{} {}", command.method(), command.endpoint())
    }

    /// Answers every matching request with `interceptor`, replacing any previous one.
    pub fn intercept(&self, command: &Command, interceptor: Interceptor) {
        self.routes
            .lock()
            .entry(Self::route_key(command))
            .or_default()
            .persistent = Some(interceptor);
    }

    /// Answers the next matching request with `interceptor`.
    ///
    /// One-shot interceptors are consumed in registration order before the persistent one.
    pub fn intercept_once(&self, command: &Command, interceptor: Interceptor) {
        self.routes
            .lock()
            .entry(Self::route_key(command))
            .or_default()
            .once
            .push_back(interceptor);
    }

    /// Number of requests received for `command`'s method and endpoint.
    pub fn calls(&self, command: &Command) -> usize {
        self.routes
            .lock()
            .get(&Self::route_key(command))
            .map_or(0, |route| route.calls)
    }

    /// Removes every interceptor and resets call counts.
    pub fn reset(&self) {
        self.routes.lock().clear();
    }

    fn next_interceptor(&self, key: &str) -> Option<Interceptor> {
        let mut routes = self.routes.lock();
        let route = routes.entry(key.to_string()).or_default();
        route.calls += 1;
        route.once.pop_front().or_else(|| route.persistent.clone())
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    async fn send(&self, request: AdapterRequest) -> Response {
        let key = Self::route_key(&request.command);
        let Some(interceptor) = self.next_interceptor(&key) else {
            trace!(route = %key, "no interceptor registered");
            return Response::network_error(format!("no interceptor for {key}"));
        };

        let size = request
            .command
            .data()
            .map_or(0, |data| data.to_string().len() as u64);
        request.progress.upload(size, size);

        if !interceptor.delay.is_zero() {
            tokio::time::sleep(interceptor.delay).await;
        }

        request.progress.response_start();
        let size = interceptor.body.to_string().len() as u64;
        request.progress.download(size, size);

        trace!(route = %key, status = interceptor.status, "intercepted");
        interceptor.into_response()
    }
}
