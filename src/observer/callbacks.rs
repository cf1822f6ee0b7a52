use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::request_manager::{Progress, RequestEvent};
use crate::response::{Response, ResponseDetails};

pub type ResponseCallback = dyn Fn(&Response, &ResponseDetails) + Send + Sync;
pub type LifecycleCallback = dyn Fn(&RequestEvent) + Send + Sync;
pub type ProgressCallback = dyn Fn(&Progress) + Send + Sync;

/// Holds the latest registered callback. Replacing it never resubscribes anything.
pub struct CallbackSlot<F: ?Sized> {
    slot: RwLock<Option<Arc<F>>>,
}

impl<F: ?Sized> Default for CallbackSlot<F> {
    fn default() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }
}

impl<F: ?Sized> fmt::Debug for CallbackSlot<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSlot")
            .field("set", &self.slot.read().is_some())
            .finish()
    }
}

impl<F: ?Sized> CallbackSlot<F> {
    pub fn set(&self, callback: Arc<F>) {
        *self.slot.write() = Some(callback);
    }

    pub fn clear(&self) {
        *self.slot.write() = None;
    }

    pub fn get(&self) -> Option<Arc<F>> {
        self.slot.read().clone()
    }

    pub fn is_set(&self) -> bool {
        self.slot.read().is_some()
    }
}

/// User callbacks of an observer.
///
/// Setting a callback replaces the previous one; the latest always wins.
#[derive(Debug, Default)]
pub struct ObserverCallbacks {
    success: CallbackSlot<ResponseCallback>,
    error: CallbackSlot<ResponseCallback>,
    abort: CallbackSlot<ResponseCallback>,
    offline_error: CallbackSlot<ResponseCallback>,
    finished: CallbackSlot<ResponseCallback>,
    request_start: CallbackSlot<LifecycleCallback>,
    response_start: CallbackSlot<LifecycleCallback>,
    upload_progress: CallbackSlot<ProgressCallback>,
    download_progress: CallbackSlot<ProgressCallback>,
}

impl ObserverCallbacks {
    pub fn on_success(&self, callback: impl Fn(&Response, &ResponseDetails) + Send + Sync + 'static) {
        self.success.set(Arc::new(callback));
    }

    pub fn on_error(&self, callback: impl Fn(&Response, &ResponseDetails) + Send + Sync + 'static) {
        self.error.set(Arc::new(callback));
    }

    pub fn on_abort(&self, callback: impl Fn(&Response, &ResponseDetails) + Send + Sync + 'static) {
        self.abort.set(Arc::new(callback));
    }

    pub fn on_offline_error(
        &self,
        callback: impl Fn(&Response, &ResponseDetails) + Send + Sync + 'static,
    ) {
        self.offline_error.set(Arc::new(callback));
    }

    /// Called after every other response callback.
    pub fn on_finished(&self, callback: impl Fn(&Response, &ResponseDetails) + Send + Sync + 'static) {
        self.finished.set(Arc::new(callback));
    }

    pub fn on_request_start(&self, callback: impl Fn(&RequestEvent) + Send + Sync + 'static) {
        self.request_start.set(Arc::new(callback));
    }

    pub fn on_response_start(&self, callback: impl Fn(&RequestEvent) + Send + Sync + 'static) {
        self.response_start.set(Arc::new(callback));
    }

    pub fn on_upload_progress(&self, callback: impl Fn(&Progress) + Send + Sync + 'static) {
        self.upload_progress.set(Arc::new(callback));
    }

    pub fn on_download_progress(&self, callback: impl Fn(&Progress) + Send + Sync + 'static) {
        self.download_progress.set(Arc::new(callback));
    }

    /// Invokes the outcome callbacks for a settled request.
    ///
    /// Exactly one of offline error, abort, success or error runs, followed by finished.
    /// A failure that settled because the client was offline counts as an offline error.
    pub(crate) fn dispatch(&self, response: &Response, details: &ResponseDetails) {
        let slot = if details.is_offline && details.is_failed {
            trace!("offline error callback");
            &self.offline_error
        } else if details.is_canceled {
            trace!("abort callback");
            &self.abort
        } else if !details.is_failed {
            trace!("success callback");
            &self.success
        } else {
            trace!("error callback");
            &self.error
        };
        if let Some(callback) = slot.get() {
            callback(response, details);
        }
        if let Some(callback) = self.finished.get() {
            callback(response, details);
        }
    }

    pub(crate) fn request_started(&self, event: &RequestEvent) {
        if let Some(callback) = self.request_start.get() {
            callback(event);
        }
    }

    pub(crate) fn response_started(&self, event: &RequestEvent) {
        if let Some(callback) = self.response_start.get() {
            callback(event);
        }
    }

    pub(crate) fn upload_progressed(&self, progress: &Progress) {
        if let Some(callback) = self.upload_progress.get() {
            callback(progress);
        }
    }

    pub(crate) fn download_progressed(&self, progress: &Progress) {
        if let Some(callback) = self.download_progress.get() {
            callback(progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn recorder(callbacks: &ObserverCallbacks) -> Arc<Mutex<Vec<&'static str>>> {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let record = |name: &'static str| {
            let calls = calls.clone();
            move |_: &Response, _: &ResponseDetails| calls.lock().push(name)
        };
        callbacks.on_success(record("success"));
        callbacks.on_error(record("error"));
        callbacks.on_abort(record("abort"));
        callbacks.on_offline_error(record("offline"));
        callbacks.on_finished(record("finished"));
        calls
    }

    #[test]
    fn test_success_then_finished() {
        let callbacks = ObserverCallbacks::default();
        let calls = recorder(&callbacks);
        let response = Response::success(200, json!(1));

        callbacks.dispatch(&response, &ResponseDetails::new(&response, 0, false));
        assert_eq!(*calls.lock(), vec!["success", "finished"]);
    }

    #[test]
    fn test_offline_error_takes_precedence() {
        let callbacks = ObserverCallbacks::default();
        let calls = recorder(&callbacks);
        let response = Response::offline();
        let details = ResponseDetails::new(&response, 0, true);

        callbacks.dispatch(&response, &details);
        assert_eq!(*calls.lock(), vec!["offline", "finished"]);
    }

    #[test]
    fn test_abort() {
        let callbacks = ObserverCallbacks::default();
        let calls = recorder(&callbacks);

        callbacks.dispatch(&Response::aborted(), &ResponseDetails::canceled());
        assert_eq!(*calls.lock(), vec!["abort", "finished"]);
    }

    #[test]
    fn test_latest_callback_wins() {
        let callbacks = ObserverCallbacks::default();
        let calls = Arc::new(Mutex::new(Vec::new()));
        {
            let calls = calls.clone();
            callbacks.on_error(move |_, _| calls.lock().push(1));
        }
        {
            let calls = calls.clone();
            callbacks.on_error(move |_, _| calls.lock().push(2));
        }

        let response = Response::http_error(500, None);
        callbacks.dispatch(&response, &ResponseDetails::new(&response, 0, false));
        assert_eq!(*calls.lock(), vec![2]);
    }

    #[test]
    fn test_slot_clear() {
        let slot = CallbackSlot::<ProgressCallback>::default();
        slot.set(Arc::new(|_: &Progress| {}));
        assert!(slot.is_set());
        slot.clear();
        assert!(slot.get().is_none());
    }
}
