//! The pluggable transport boundary.
//!
//! The core never performs network I/O itself. Every send goes through an
//! [`Adapter`], which receives an [`AdapterRequest`] and returns a
//! [`Response`]. Transport failures are responses too: status `0` with a
//! [`RequestError::Network`](crate::response::RequestError::Network) in the error slot.
//!
//! # Example
//!
//! ```
//! use hyperflow::adapter::{Adapter, AdapterRequest};
//! use hyperflow::response::Response;
//! use serde_json::json;
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl Adapter for Echo {
//!     async fn send(&self, request: AdapterRequest) -> Response {
//!         request.progress.response_start();
//!         Response::success(200, json!({ "endpoint": request.command.endpoint() }))
//!     }
//! }
//! ```

pub mod mock;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::command::Command;
use crate::request_id::RequestId;
use crate::request_manager::{Progress, RequestEvent, RequestManager};
use crate::response::Response;

pub use mock::{Interceptor, MockAdapter};

/// Executes a single request attempt.
#[async_trait]
pub trait Adapter: Send + Sync {
    async fn send(&self, request: AdapterRequest) -> Response;
}

/// Everything an adapter needs for one attempt.
#[derive(Debug, Clone)]
pub struct AdapterRequest {
    pub request_id: RequestId,
    pub command: Arc<Command>,
    pub progress: ProgressReporter,
    /// Cancelled when the request is aborted. Honoring it is best-effort.
    pub cancel: CancellationToken,
}

/// Reports response start and transfer progress for one attempt.
///
/// Reports made after the request was aborted are dropped.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    request_id: RequestId,
    command: Arc<Command>,
    events: RequestManager,
    cancel: CancellationToken,
    started: Instant,
    response_started: Arc<AtomicBool>,
}

impl ProgressReporter {
    pub(crate) fn new(
        request_id: RequestId,
        command: Arc<Command>,
        events: RequestManager,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            request_id,
            command,
            events,
            cancel,
            started: Instant::now(),
            response_started: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signals that the response started arriving. Only the first call emits.
    pub fn response_start(&self) {
        if self.cancel.is_cancelled() || self.response_started.swap(true, Ordering::AcqRel) {
            return;
        }
        self.events.emit_response_start(&RequestEvent {
            request_id: self.request_id.clone(),
            command: Arc::clone(&self.command),
        });
    }

    pub fn upload(&self, loaded: u64, total: u64) {
        if self.cancel.is_cancelled() {
            return;
        }
        let progress = Progress::compute(loaded, total, self.started);
        self.events
            .emit_upload_progress(&self.request_id, &progress);
    }

    pub fn download(&self, loaded: u64, total: u64) {
        if self.cancel.is_cancelled() {
            return;
        }
        let progress = Progress::compute(loaded, total, self.started);
        self.events
            .emit_download_progress(&self.request_id, &progress);
    }
}

/// Adapts an async closure into an [`Adapter`].
///
/// ```
/// use hyperflow::adapter::{AdapterRequest, FnAdapter};
/// use hyperflow::response::Response;
///
/// let adapter = FnAdapter::new(|_request: AdapterRequest| async {
///     Response::network_error("offline")
/// });
/// ```
pub struct FnAdapter<F> {
    send: F,
}

impl<F> FnAdapter<F> {
    pub const fn new(send: F) -> Self {
        Self { send }
    }
}

#[async_trait]
impl<F, Fut> Adapter for FnAdapter<F>
where
    F: Fn(AdapterRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Response> + Send,
{
    async fn send(&self, request: AdapterRequest) -> Response {
        (self.send)(request).await
    }
}
