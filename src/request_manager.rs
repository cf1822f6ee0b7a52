//! Per-request lifecycle events.
//!
//! Observers subscribe by request id to follow a single request through request start,
//! upload progress, response start, download progress and the final response. Abort
//! notifications are keyed by the command's abort key instead, so an observer hears about
//! aborts of any request it could have issued.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::command::Command;
use crate::events::{Emitter, EventHandle};
use crate::request_id::RequestId;
use crate::response::ResponseEvent;

/// Emitted when a request is sent and when its response starts arriving.
#[derive(Debug, Clone)]
pub struct RequestEvent {
    pub request_id: RequestId,
    pub command: Arc<Command>,
}

/// Emitted for every request removed by an abort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortEvent {
    pub request_id: RequestId,
    pub abort_key: String,
    pub queue_key: String,
}

/// Upload or download progress of a request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub loaded: u64,
    pub total: u64,
    /// Completion in percent, `0.0..=100.0`.
    pub progress: f64,
    pub size_left: u64,
    /// Estimated from the transfer rate so far. `None` until anything was transferred.
    pub time_left: Option<Duration>,
}

impl Progress {
    /// Computes progress for `loaded` out of `total` bytes, transferred since `started`.
    pub fn compute(loaded: u64, total: u64, started: Instant) -> Self {
        let loaded = loaded.min(total);
        let size_left = total - loaded;
        let progress = if total == 0 {
            100.0
        } else {
            let ratio = loaded as f64 / total as f64;
            ratio * 100.0
        };

        let elapsed = started.elapsed();
        let time_left = (loaded > 0).then(|| {
            let per_byte = elapsed.as_secs_f64() / loaded as f64;
            Duration::from_secs_f64(per_byte * size_left as f64)
        });

        Self {
            loaded,
            total,
            progress,
            size_left,
            time_left,
        }
    }
}

/// Lifecycle event hub shared by both dispatchers of a client.
#[derive(Debug, Clone, Default)]
pub struct RequestManager {
    request_start: Emitter<RequestEvent>,
    response_start: Emitter<RequestEvent>,
    upload_progress: Emitter<Progress>,
    download_progress: Emitter<Progress>,
    response: Emitter<ResponseEvent>,
    abort: Emitter<AbortEvent>,
}

impl RequestManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_request_start<F>(&self, request_id: &RequestId, callback: F) -> EventHandle
    where
        F: Fn(&RequestEvent) + Send + Sync + 'static,
    {
        self.request_start.on(request_id.as_str(), callback)
    }

    pub fn on_response_start<F>(&self, request_id: &RequestId, callback: F) -> EventHandle
    where
        F: Fn(&RequestEvent) + Send + Sync + 'static,
    {
        self.response_start.on(request_id.as_str(), callback)
    }

    pub fn on_upload_progress<F>(&self, request_id: &RequestId, callback: F) -> EventHandle
    where
        F: Fn(&Progress) + Send + Sync + 'static,
    {
        self.upload_progress.on(request_id.as_str(), callback)
    }

    pub fn on_download_progress<F>(&self, request_id: &RequestId, callback: F) -> EventHandle
    where
        F: Fn(&Progress) + Send + Sync + 'static,
    {
        self.download_progress.on(request_id.as_str(), callback)
    }

    pub fn on_response<F>(&self, request_id: &RequestId, callback: F) -> EventHandle
    where
        F: Fn(&ResponseEvent) + Send + Sync + 'static,
    {
        self.response.on(request_id.as_str(), callback)
    }

    pub fn on_abort<F>(&self, abort_key: impl Into<String>, callback: F) -> EventHandle
    where
        F: Fn(&AbortEvent) + Send + Sync + 'static,
    {
        self.abort.on(abort_key, callback)
    }

    pub(crate) fn emit_request_start(&self, event: &RequestEvent) {
        self.request_start.emit(event.request_id.as_str(), event);
    }

    pub(crate) fn emit_response_start(&self, event: &RequestEvent) {
        self.response_start.emit(event.request_id.as_str(), event);
    }

    pub(crate) fn emit_upload_progress(&self, request_id: &RequestId, progress: &Progress) {
        self.upload_progress.emit(request_id.as_str(), progress);
    }

    pub(crate) fn emit_download_progress(&self, request_id: &RequestId, progress: &Progress) {
        self.download_progress.emit(request_id.as_str(), progress);
    }

    pub(crate) fn emit_response(&self, event: &ResponseEvent) {
        self.response.emit(event.request_id.as_str(), event);
    }

    pub(crate) fn emit_abort(&self, event: &AbortEvent) {
        self.abort.emit(&event.abort_key, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{Response, ResponseDetails};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_progress_compute() {
        let started = Instant::now();
        let progress = Progress::compute(25, 100, started);
        assert_eq!(progress.size_left, 75);
        assert!((progress.progress - 25.0).abs() < f64::EPSILON);
        assert!(progress.time_left.is_some());
    }

    #[test]
    fn test_progress_empty_body_is_complete() {
        let progress = Progress::compute(0, 0, Instant::now());
        assert!((progress.progress - 100.0).abs() < f64::EPSILON);
        assert_eq!(progress.size_left, 0);
        assert!(progress.time_left.is_none());
    }

    #[test]
    fn test_response_listeners_are_keyed_by_request_id() {
        let manager = RequestManager::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let id = RequestId::new();

        let counter = calls.clone();
        let _handle = manager.on_response(&id, move |event| {
            assert!(event.response.is_success());
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let response = Response::success(200, serde_json::json!(1));
        let details = ResponseDetails::new(&response, 0, false);
        manager.emit_response(&ResponseEvent {
            request_id: id.clone(),
            response: response.clone(),
            details: details.clone(),
        });
        manager.emit_response(&ResponseEvent {
            request_id: RequestId::new(),
            response,
            details,
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_abort_listeners_are_keyed_by_abort_key() {
        let manager = RequestManager::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let _handle = manager.on_abort("GET_/users", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        manager.emit_abort(&AbortEvent {
            request_id: RequestId::new(),
            abort_key: "GET_/users".to_string(),
            queue_key: "GET_/users_".to_string(),
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
