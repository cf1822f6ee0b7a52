//! # Hyperflow - request dispatching and caching core
//!
//! Hyperflow is the engine behind client-side data fetching: it queues, deduplicates,
//! retries and caches requests issued through a pluggable transport [`Adapter`], and
//! broadcasts every settled response to all observers of the same resource.
//!
//! ## Architecture
//!
//! 1. **Command**: an immutable request descriptor with derived cache, queue and abort keys
//! 2. **Dispatcher**: per-queue-key FIFO execution with concurrency, deduplication,
//!    retry, offline holding and abort
//! 3. **Cache**: last settled response per cache key, broadcast to subscribers on write
//! 4. **Observers**: headless bindings exposing a reactive state snapshot
//! 5. **Socket**: WebSocket client with heartbeat keep-alive
//!
//! ## Core Components
//!
//! - [`Client`](client::Client): owns the cache, connectivity state and both dispatchers
//! - [`Command`](command::Command): what to send and how to treat it
//! - [`Dispatcher`](dispatcher::Dispatcher): executes queued requests
//! - [`Cache`](cache::Cache): shared response store with change notifications
//! - [`FetchObserver`](observer::FetchObserver) and
//!   [`SubmitObserver`](observer::SubmitObserver): `useFetch`/`useSubmit` without a view layer
//! - [`SocketClient`](socket::SocketClient): named-event socket with liveness detection
//!
//! ## Example
//!
//! ```rust
//! use hyperflow::prelude::*;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mock = MockAdapter::new();
//! let command = Command::new("/users/:id")
//!     .with_param("id", 7)
//!     .with_retry(2)
//!     .with_deduplicate(true);
//! mock.intercept(&command, Interceptor::ok(json!({ "id": 7 })));
//!
//! let client = Client::new(mock);
//! let (data, error, status) = client.fetch(command).await.into_tuple();
//!
//! assert_eq!(data, Some(json!({ "id": 7 })));
//! assert!(error.is_none());
//! assert_eq!(status, 200);
//! # }
//! ```
//!
//! ## Logging
//!
//! The crate logs through [`tracing`] and never installs a subscriber.
//!
//! [`Adapter`]: adapter::Adapter

pub mod adapter;
pub mod app_manager;
pub mod cache;
pub mod client;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod events;
pub mod observer;
pub mod prelude;
pub mod request_id;
pub mod request_manager;
pub mod response;
pub mod socket;
