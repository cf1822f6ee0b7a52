//! Per-key request queues with deduplication, retry, offline holding and abort.
//!
//! A [`Dispatcher`] owns one FIFO queue per queue key. Each queued request is executed by
//! its own Tokio task that loops through send attempts until the request settles. All
//! queue state lives behind one short `parking_lot` critical section; listeners, the cache
//! and resolvers are only invoked after the lock is released.
//!
//! # Example
//!
//! ```no_run
//! use hyperflow::prelude::*;
//! use serde_json::json;
//!
//! # async fn example() {
//! let mock = MockAdapter::new();
//! let command = Command::new("/users").with_deduplicate(true);
//! mock.intercept(&command, Interceptor::ok(json!([])));
//!
//! let client = Client::new(mock);
//! let first = client.fetch_dispatcher().add(command.clone());
//! let second = client.fetch_dispatcher().add(command.clone());
//! assert_eq!(first, second);
//! # }
//! ```

mod dedup;
mod queue;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::adapter::{Adapter, AdapterRequest, ProgressReporter};
use crate::app_manager::AppManager;
use crate::cache::{Cache, CacheEntry};
use crate::command::Command;
use crate::config::DispatcherConfig;
use crate::events::{Emitter, EventHandle};
use crate::request_id::RequestId;
use crate::request_manager::{AbortEvent, RequestEvent, RequestManager};
use crate::response::{Response, ResponseDetails, ResponseEvent};

use dedup::DedupTable;
use queue::{Entry, Queue};

pub use queue::{ItemStatus, QueueItem};

/// Which of the two dispatchers of a client a request goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatcherKind {
    /// Reads. Deduplicates identical in-flight requests.
    Fetch,
    /// Mutations. Never deduplicates.
    Submit,
}

/// Emitted when a queue becomes non-empty or empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadingEvent {
    pub queue_key: String,
    pub is_loading: bool,
}

/// Result of [`Dispatcher::enqueue`].
#[derive(Debug)]
pub struct Enqueued {
    /// The id the outcome will be reported under. For a deduplicated request this is the id
    /// of the request it attached to.
    pub request_id: RequestId,
    pub deduplicated: bool,
    pub receiver: oneshot::Receiver<ResponseEvent>,
}

type Startable = (RequestId, Arc<Command>, u32, CancellationToken);

#[derive(Default)]
struct State {
    queues: HashMap<String, Queue>,
    dedup: DedupTable,
    sent: HashMap<String, usize>,
    locations: HashMap<RequestId, String>,
    /// Queue keys whose last emitted loading event was `true`.
    announced: HashSet<String>,
}

impl State {
    fn entry_mut(&mut self, request_id: &RequestId) -> Option<&mut Entry> {
        let queue_key = self.locations.get(request_id)?;
        self.queues.get_mut(queue_key)?.get_mut(request_id)
    }

    /// The entry, unless the attempt driven by `cancel` was interrupted or aborted.
    fn attempt_mut(
        &mut self,
        request_id: &RequestId,
        cancel: &CancellationToken,
    ) -> Option<&mut Entry> {
        if cancel.is_cancelled() {
            return None;
        }
        self.entry_mut(request_id)
    }

    /// Removes a request, dropping its queue if that leaves a running queue empty.
    fn take(&mut self, request_id: &RequestId) -> Option<Entry> {
        let queue_key = self.locations.remove(request_id)?;
        let queue = self.queues.get_mut(&queue_key)?;
        let entry = queue.remove(request_id)?;
        if queue.entries.is_empty() && !queue.stopped {
            self.queues.remove(&queue_key);
        }
        self.dedup.release(&queue_key, request_id);
        Some(entry)
    }

    /// The loading event owed for `queue_key`, if its emptiness changed since the last one.
    fn loading_transition(&mut self, queue_key: &str) -> Option<LoadingEvent> {
        let is_loading = self
            .queues
            .get(queue_key)
            .is_some_and(|queue| !queue.entries.is_empty());
        if is_loading == self.announced.contains(queue_key) {
            return None;
        }
        if is_loading {
            self.announced.insert(queue_key.to_string());
        } else {
            self.announced.remove(queue_key);
        }
        Some(LoadingEvent {
            queue_key: queue_key.to_string(),
            is_loading,
        })
    }
}

/// Everything collected under the lock that has to happen after it is released.
#[derive(Default)]
struct Effects {
    aborted: Vec<Entry>,
    /// Queue keys whose loading state may have changed.
    loading: Vec<String>,
    start: Vec<Startable>,
}

struct Inner {
    kind: DispatcherKind,
    config: DispatcherConfig,
    state: Mutex<State>,
    adapter: Arc<dyn Adapter>,
    cache: Cache,
    app: AppManager,
    requests: RequestManager,
    loading: Emitter<LoadingEvent>,
    /// Serializes loading transitions across threads. Reentrant so listeners may enqueue.
    loading_order: ReentrantMutex<()>,
}

/// Executes requests of one [`DispatcherKind`].
///
/// Cloning is cheap and shares the queues.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("kind", &self.inner.kind)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub(crate) fn new(
        kind: DispatcherKind,
        config: DispatcherConfig,
        adapter: Arc<dyn Adapter>,
        cache: Cache,
        app: AppManager,
        requests: RequestManager,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                kind,
                config,
                state: Mutex::new(State::default()),
                adapter,
                cache,
                app,
                requests,
                loading: Emitter::new(),
                loading_order: ReentrantMutex::new(()),
            }),
        }
    }

    pub fn kind(&self) -> DispatcherKind {
        self.inner.kind
    }

    /// Queues `command` and returns the id its outcome is reported under.
    ///
    /// Must be called within a Tokio runtime.
    pub fn add(&self, command: Command) -> RequestId {
        self.enqueue(command, RequestId::new()).request_id
    }

    /// Queues `command` and returns a receiver for its final outcome.
    ///
    /// Must be called within a Tokio runtime.
    pub fn add_and_wait(&self, command: Command) -> (RequestId, oneshot::Receiver<ResponseEvent>) {
        let enqueued = self.enqueue(command, RequestId::new());
        (enqueued.request_id, enqueued.receiver)
    }

    /// Queues `command` under a caller-chosen `request_id`.
    ///
    /// On the fetch dispatcher a command with deduplication enabled attaches to the latest
    /// live request of its queue instead, as long as that request is within the command's
    /// deduplication window. The returned id then belongs to that request.
    ///
    /// Must be called within a Tokio runtime.
    pub fn enqueue(&self, command: Command, request_id: RequestId) -> Enqueued {
        let queue_key = command.queue_key();
        let (sender, receiver) = oneshot::channel();
        let mut effects = Effects::default();

        {
            let mut state = self.inner.state.lock();

            if self.inner.kind == DispatcherKind::Fetch && command.deduplicate() {
                let now = Instant::now();
                let target = state
                    .dedup
                    .lookup(&queue_key, command.deduplicate_time(), now)
                    .cloned();
                if let Some(target) = target
                    && let Some(entry) = state.entry_mut(&target)
                {
                    entry.waiters.push(sender);
                    debug!(request_id = %target, %queue_key, "request deduplicated");
                    return Enqueued {
                        request_id: target,
                        deduplicated: true,
                        receiver,
                    };
                }
            }

            if command.cancelable() {
                let earlier: Vec<RequestId> = state
                    .queues
                    .get(&queue_key)
                    .map(|queue| {
                        queue
                            .entries
                            .iter()
                            .map(|entry| entry.item.request_id.clone())
                            .collect()
                    })
                    .unwrap_or_default();
                for id in earlier {
                    if let Some(entry) = state.take(&id) {
                        effects.aborted.push(entry);
                    }
                }
            }

            let deduplicate = command.deduplicate();
            let queue = state.queues.entry(queue_key.clone()).or_default();
            queue.entries.push_back(Entry::new(
                request_id.clone(),
                Arc::new(command),
                queue_key.clone(),
                sender,
            ));
            effects.start = queue.take_startable(self.inner.config.effective_concurrency());

            state
                .locations
                .insert(request_id.clone(), queue_key.clone());
            effects.loading.push(queue_key.clone());
            if self.inner.kind == DispatcherKind::Fetch && deduplicate {
                state
                    .dedup
                    .register(queue_key.clone(), request_id.clone(), Instant::now());
            }
        }

        debug!(%request_id, %queue_key, kind = ?self.inner.kind, "request queued");
        self.apply(effects);

        Enqueued {
            request_id,
            deduplicated: false,
            receiver,
        }
    }

    /// FIFO snapshot of the requests held under `queue_key`.
    pub fn get_queue(&self, queue_key: &str) -> Vec<QueueItem> {
        self.inner
            .state
            .lock()
            .queues
            .get(queue_key)
            .map(|queue| {
                queue
                    .entries
                    .iter()
                    .map(|entry| entry.item.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of adapter sends made for `queue_key`, retries included.
    pub fn get_queue_request_count(&self, queue_key: &str) -> usize {
        self.inner
            .state
            .lock()
            .sent
            .get(queue_key)
            .copied()
            .unwrap_or(0)
    }

    /// Number of requests of `queue_key` currently occupying a concurrency slot.
    pub fn get_running_count(&self, queue_key: &str) -> usize {
        self.inner
            .state
            .lock()
            .queues
            .get(queue_key)
            .map_or(0, Queue::running_count)
    }

    pub fn is_loading(&self, queue_key: &str) -> bool {
        self.inner
            .state
            .lock()
            .queues
            .get(queue_key)
            .is_some_and(|queue| !queue.entries.is_empty())
    }

    /// Registers `callback` for loading transitions of `queue_key`.
    pub fn on_loading<F>(&self, queue_key: impl Into<String>, callback: F) -> EventHandle
    where
        F: Fn(&LoadingEvent) + Send + Sync + 'static,
    {
        self.inner.loading.on(queue_key, callback)
    }

    /// Aborts a single request. Returns `false` if it was not queued.
    pub fn abort(&self, request_id: &RequestId) -> bool {
        let mut effects = Effects::default();
        {
            let mut state = self.inner.state.lock();
            let Some(entry) = state.take(request_id) else {
                return false;
            };
            if let Some(queue) = state.queues.get_mut(&entry.item.queue_key) {
                effects.start = queue.take_startable(self.inner.config.effective_concurrency());
            }
            effects.loading.push(entry.item.queue_key.clone());
            effects.aborted.push(entry);
        }
        self.apply(effects);
        true
    }

    /// Aborts every request of `queue_key`. Returns how many were aborted.
    pub fn abort_queue(&self, queue_key: &str) -> usize {
        self.abort_where(|item| item.queue_key == queue_key)
    }

    /// Aborts every request whose command has `abort_key`. Returns how many were aborted.
    pub fn abort_by_key(&self, abort_key: &str) -> usize {
        self.abort_where(|item| item.command.abort_key() == abort_key)
    }

    fn abort_where(&self, predicate: impl Fn(&QueueItem) -> bool) -> usize {
        let mut effects = Effects::default();
        {
            let mut state = self.inner.state.lock();
            let ids: Vec<RequestId> = state
                .queues
                .values()
                .flat_map(|queue| queue.entries.iter())
                .filter(|entry| predicate(&entry.item))
                .map(|entry| entry.item.request_id.clone())
                .collect();
            for id in ids {
                if let Some(entry) = state.take(&id) {
                    if !effects.loading.contains(&entry.item.queue_key) {
                        effects.loading.push(entry.item.queue_key.clone());
                    }
                    effects.aborted.push(entry);
                }
            }
            let concurrency = self.inner.config.effective_concurrency();
            for queue in state.queues.values_mut() {
                effects.start.extend(queue.take_startable(concurrency));
            }
        }
        let count = effects.aborted.len();
        self.apply(effects);
        count
    }

    /// Pauses `queue_key`. Running attempts are cancelled and re-sent on [`Self::start_queue`].
    pub fn stop_queue(&self, queue_key: &str) {
        let mut state = self.inner.state.lock();
        let queue = state.queues.entry(queue_key.to_string()).or_default();
        queue.stopped = true;
        for entry in &mut queue.entries {
            entry.interrupt();
        }
        debug!(%queue_key, "queue stopped");
    }

    pub fn start_queue(&self, queue_key: &str) {
        let mut effects = Effects::default();
        {
            let mut state = self.inner.state.lock();
            let concurrency = self.inner.config.effective_concurrency();
            if let Some(queue) = state.queues.get_mut(queue_key) {
                queue.stopped = false;
                effects.start = queue.take_startable(concurrency);
                if queue.entries.is_empty() {
                    state.queues.remove(queue_key);
                }
            }
        }
        debug!(%queue_key, "queue started");
        self.apply(effects);
    }

    /// Pauses a single request. A running attempt is cancelled and re-sent on
    /// [`Self::start_request`].
    pub fn stop_request(&self, request_id: &RequestId) {
        let mut effects = Effects::default();
        {
            let mut state = self.inner.state.lock();
            let concurrency = self.inner.config.effective_concurrency();
            let Some(entry) = state.entry_mut(request_id) else {
                return;
            };
            entry.item.stopped = true;
            entry.interrupt();
            let queue_key = entry.item.queue_key.clone();
            if let Some(queue) = state.queues.get_mut(&queue_key) {
                effects.start = queue.take_startable(concurrency);
            }
        }
        self.apply(effects);
    }

    pub fn start_request(&self, request_id: &RequestId) {
        let mut effects = Effects::default();
        {
            let mut state = self.inner.state.lock();
            let concurrency = self.inner.config.effective_concurrency();
            let Some(entry) = state.entry_mut(request_id) else {
                return;
            };
            entry.item.stopped = false;
            let queue_key = entry.item.queue_key.clone();
            if let Some(queue) = state.queues.get_mut(&queue_key) {
                effects.start = queue.take_startable(concurrency);
            }
        }
        self.apply(effects);
    }

    /// Aborts every request and resets send counters and deduplication.
    pub fn clear(&self) {
        self.abort_where(|_| true);
        let mut state = self.inner.state.lock();
        state.queues.clear();
        state.sent.clear();
        state.dedup.clear();
        state.announced.clear();
    }

    /// Runs the work collected under the lock. Loading transitions go out before any
    /// abort listener can enqueue again.
    fn apply(&self, effects: Effects) {
        for queue_key in &effects.loading {
            self.inner.sync_loading(queue_key);
        }
        for entry in effects.aborted {
            self.inner.deliver_abort(entry);
        }
        for (request_id, command, retries, cancel) in effects.start {
            tokio::spawn(Arc::clone(&self.inner).run(request_id, command, retries, cancel));
        }
    }
}

impl Inner {
    /// Drives one request through its send attempts until it settles or is cancelled.
    async fn run(
        self: Arc<Self>,
        request_id: RequestId,
        command: Arc<Command>,
        mut retries: u32,
        cancel: CancellationToken,
    ) {
        loop {
            if !self.app.is_online() {
                if !command.offline() {
                    debug!(%request_id, "client offline, request not held");
                    self.settle(&request_id, &cancel, Response::offline(), retries, true);
                    return;
                }
                if !self.set_status(&request_id, &cancel, ItemStatus::WaitingOnline) {
                    return;
                }
                debug!(%request_id, "waiting for connectivity");
                tokio::select! {
                    () = cancel.cancelled() => return,
                    () = self.app.wait_online() => {}
                }
                continue;
            }

            if !self.mark_sent(&request_id, &cancel) {
                return;
            }
            self.requests.emit_request_start(&RequestEvent {
                request_id: request_id.clone(),
                command: Arc::clone(&command),
            });

            let request = AdapterRequest {
                request_id: request_id.clone(),
                command: Arc::clone(&command),
                progress: ProgressReporter::new(
                    request_id.clone(),
                    Arc::clone(&command),
                    self.requests.clone(),
                    cancel.clone(),
                ),
                cancel: cancel.clone(),
            };
            let response = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                response = self.adapter.send(request) => response,
            };
            if cancel.is_cancelled() {
                return;
            }

            if response.is_success() {
                self.settle(&request_id, &cancel, response, retries, false);
                return;
            }

            if command.offline() && !self.app.is_online() {
                debug!(%request_id, status = response.status, "failed while offline, holding");
                continue;
            }

            if retries < command.retry() {
                retries += 1;
                warn!(%request_id, retries, status = response.status, "request failed, retrying");
                if !self.record_retry(&request_id, &cancel, &command, &response, retries) {
                    return;
                }
                tokio::select! {
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(command.retry_time()) => {}
                }
                continue;
            }

            self.settle(&request_id, &cancel, response, retries, false);
            return;
        }
    }

    fn set_status(
        &self,
        request_id: &RequestId,
        cancel: &CancellationToken,
        status: ItemStatus,
    ) -> bool {
        let mut state = self.state.lock();
        match state.attempt_mut(request_id, cancel) {
            Some(entry) => {
                entry.item.status = status;
                true
            }
            None => false,
        }
    }

    fn mark_sent(&self, request_id: &RequestId, cancel: &CancellationToken) -> bool {
        let mut state = self.state.lock();
        let Some(entry) = state.attempt_mut(request_id, cancel) else {
            return false;
        };
        entry.item.status = ItemStatus::InFlight;
        let queue_key = entry.item.queue_key.clone();
        *state.sent.entry(queue_key).or_default() += 1;
        true
    }

    fn record_retry(
        &self,
        request_id: &RequestId,
        cancel: &CancellationToken,
        command: &Command,
        response: &Response,
        retries: u32,
    ) -> bool {
        {
            let mut state = self.state.lock();
            let Some(entry) = state.attempt_mut(request_id, cancel) else {
                return false;
            };
            entry.item.retries = retries;
            entry.item.status = ItemStatus::RetryScheduled;
        }
        self.write_cache(command, response.clone(), retries);
        true
    }

    fn write_cache(&self, command: &Command, response: Response, retries: u32) {
        if !command.cache() {
            return;
        }
        let key = command.cache_key();
        let is_refreshed = self.cache.get(&key).is_some();
        let entry = CacheEntry::new(key, response)
            .with_retries(retries)
            .with_cache_time(command.cache_time())
            .with_refreshed(is_refreshed);
        self.cache.set(entry);
    }

    /// Removes the request and delivers its final outcome.
    fn settle(
        self: &Arc<Self>,
        request_id: &RequestId,
        cancel: &CancellationToken,
        response: Response,
        retries: u32,
        is_offline: bool,
    ) {
        let mut start = Vec::new();
        let entry = {
            let mut state = self.state.lock();
            if state.attempt_mut(request_id, cancel).is_none() {
                return;
            }
            let Some(entry) = state.take(request_id) else {
                return;
            };
            if let Some(queue) = state.queues.get_mut(&entry.item.queue_key) {
                start = queue.take_startable(self.config.effective_concurrency());
            }
            entry
        };

        trace!(%request_id, status = response.status, retries, "request settled");
        self.sync_loading(&entry.item.queue_key);
        if !is_offline {
            self.write_cache(&entry.item.command, response.clone(), retries);
        }

        let event = ResponseEvent {
            request_id: request_id.clone(),
            details: ResponseDetails::new(&response, retries, is_offline),
            response,
        };
        self.requests.emit_response(&event);
        for waiter in entry.waiters {
            let _ = waiter.send(event.clone());
        }

        for (request_id, command, retries, cancel) in start {
            tokio::spawn(Arc::clone(self).run(request_id, command, retries, cancel));
        }
    }

    /// Emits the loading event owed for `queue_key`, computed and sent as one step so
    /// transitions reach listeners in the order they happened.
    fn sync_loading(&self, queue_key: &str) {
        let _order = self.loading_order.lock();
        let event = self.state.lock().loading_transition(queue_key);
        if let Some(event) = event {
            trace!(%queue_key, is_loading = event.is_loading, "loading changed");
            self.loading.emit(queue_key, &event);
        }
    }

    fn deliver_abort(&self, entry: Entry) {
        entry.cancel.cancel();
        let item = entry.item;
        debug!(request_id = %item.request_id, queue_key = %item.queue_key, "request aborted");

        self.requests.emit_abort(&AbortEvent {
            request_id: item.request_id.clone(),
            abort_key: item.command.abort_key(),
            queue_key: item.queue_key.clone(),
        });

        let event = ResponseEvent {
            request_id: item.request_id,
            response: Response::aborted(),
            details: ResponseDetails {
                retries: item.retries,
                ..ResponseDetails::canceled()
            },
        };
        self.requests.emit_response(&event);
        for waiter in entry.waiters {
            let _ = waiter.send(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Interceptor, MockAdapter};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn dispatcher(kind: DispatcherKind, mock: &MockAdapter, concurrency: usize) -> Dispatcher {
        Dispatcher::new(
            kind,
            DispatcherConfig::new(concurrency),
            Arc::new(mock.clone()),
            Cache::new(),
            AppManager::new(),
            RequestManager::new(),
        )
    }

    fn slow(millis: u64) -> Interceptor {
        Interceptor::ok(json!("ok")).with_delay(Duration::from_millis(millis))
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_and_wait_resolves() {
        let mock = MockAdapter::new();
        let command = Command::new("/users");
        mock.intercept(&command, Interceptor::ok(json!([1])));
        let dispatcher = dispatcher(DispatcherKind::Fetch, &mock, 1);

        let (request_id, receiver) = dispatcher.add_and_wait(command.clone());
        let event = receiver.await.expect("request should settle");

        assert_eq!(event.request_id, request_id);
        assert_eq!(event.response.data, Some(json!([1])));
        assert!(!event.details.is_failed);
        assert!(!dispatcher.is_loading(&command.queue_key()));
        assert_eq!(dispatcher.get_queue_request_count(&command.queue_key()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_limits_running_requests() {
        let mock = MockAdapter::new();
        let command = Command::new("/jobs").with_method(crate::command::Method::Post);
        mock.intercept(&command, slow(100));
        let dispatcher = dispatcher(DispatcherKind::Submit, &mock, 1);
        let queue_key = command.queue_key();

        let (_, first) = dispatcher.add_and_wait(command.clone());
        let (_, second) = dispatcher.add_and_wait(command.clone());

        assert_eq!(dispatcher.get_queue(&queue_key).len(), 2);
        assert_eq!(dispatcher.get_running_count(&queue_key), 1);

        first.await.expect("first settles");
        assert_eq!(dispatcher.get_queue(&queue_key).len(), 1);
        second.await.expect("second settles");
        assert_eq!(mock.calls(&command), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_never_deduplicates() {
        let mock = MockAdapter::new();
        let command = Command::new("/jobs")
            .with_method(crate::command::Method::Post)
            .with_deduplicate(true);
        mock.intercept(&command, slow(10));
        let dispatcher = dispatcher(DispatcherKind::Submit, &mock, 1);

        let first = dispatcher.add(command.clone());
        let second = dispatcher.add(command.clone());
        assert_ne!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_delivers_canceled_response() {
        let mock = MockAdapter::new();
        let command = Command::new("/users");
        mock.intercept(&command, slow(100));
        let dispatcher = dispatcher(DispatcherKind::Fetch, &mock, 1);

        let loading = Arc::new(AtomicUsize::new(0));
        let counter = loading.clone();
        let _handle = dispatcher.on_loading(command.queue_key(), move |event| {
            if !event.is_loading {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let (request_id, receiver) = dispatcher.add_and_wait(command.clone());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(dispatcher.abort(&request_id));
        assert!(!dispatcher.abort(&request_id));

        let event = receiver.await.expect("abort resolves the waiter");
        assert_eq!(event.response, Response::aborted());
        assert!(event.details.is_canceled);
        assert_eq!(loading.load(Ordering::SeqCst), 1);
        assert!(dispatcher.get_queue(&command.queue_key()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelable_aborts_earlier_requests() {
        let mock = MockAdapter::new();
        let command = Command::new("/search").with_cancelable(true);
        mock.intercept(&command, slow(50));
        let dispatcher = dispatcher(DispatcherKind::Fetch, &mock, 1);

        let events = Arc::new(Mutex::new(Vec::new()));
        let _loading = {
            let events = events.clone();
            dispatcher.on_loading(command.queue_key(), move |event| {
                events.lock().push(event.is_loading);
            })
        };

        let (_, first) = dispatcher.add_and_wait(command.clone());
        let (_, second) = dispatcher.add_and_wait(command.clone());

        let first = first.await.expect("first resolves");
        let second = second.await.expect("second resolves");
        assert!(first.details.is_canceled);
        assert!(second.response.is_success());
        assert_eq!(*events.lock(), vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requeue_from_response_listener_keeps_loading() {
        let mock = MockAdapter::new();
        let command = Command::new("/jobs").with_method(crate::command::Method::Post);
        mock.intercept(&command, slow(10));
        let dispatcher = dispatcher(DispatcherKind::Submit, &mock, 1);
        let queue_key = command.queue_key();

        let events = Arc::new(Mutex::new(Vec::new()));
        let _loading = {
            let events = events.clone();
            dispatcher.on_loading(queue_key.clone(), move |event| {
                events.lock().push(event.is_loading);
            })
        };

        let request_id = RequestId::new();
        let requeued = Arc::new(Mutex::new(None));
        let _response = {
            let dispatcher = dispatcher.clone();
            let command = command.clone();
            let requeued = requeued.clone();
            let requests = dispatcher.inner.requests.clone();
            requests.on_response(&request_id, move |_| {
                let (_, receiver) = dispatcher.add_and_wait(command.clone());
                *requeued.lock() = Some(receiver);
            })
        };

        let first = dispatcher.enqueue(command.clone(), request_id).receiver;
        first.await.expect("first settles");
        assert_eq!(*events.lock(), vec![true, false, true]);
        assert!(dispatcher.is_loading(&queue_key));

        let second = requeued.lock().take().expect("listener requeued");
        second.await.expect("second settles");
        assert_eq!(*events.lock(), vec![true, false, true, false]);
        assert!(!dispatcher.is_loading(&queue_key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_plain_fetch_is_not_a_dedup_target() {
        let mock = MockAdapter::new();
        let plain = Command::new("/users");
        let deduplicated = plain.clone().with_deduplicate(true);
        mock.intercept(&plain, slow(10));
        let dispatcher = dispatcher(DispatcherKind::Fetch, &mock, 1);

        let first = dispatcher.add(plain.clone());
        let second = dispatcher.enqueue(deduplicated.clone(), RequestId::new());
        assert!(!second.deduplicated);
        assert_ne!(first, second.request_id);

        let third = dispatcher.enqueue(deduplicated, RequestId::new());
        assert!(third.deduplicated);
        assert_eq!(third.request_id, second.request_id);

        third.receiver.await.expect("settles");
        assert_eq!(mock.calls(&plain), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_and_start_queue() {
        let mock = MockAdapter::new();
        let command = Command::new("/users");
        mock.intercept(&command, slow(10));
        let dispatcher = dispatcher(DispatcherKind::Fetch, &mock, 1);
        let queue_key = command.queue_key();

        dispatcher.stop_queue(&queue_key);
        let (_, mut receiver) = dispatcher.add_and_wait(command.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(receiver.try_recv().is_err());
        assert_eq!(dispatcher.get_queue_request_count(&queue_key), 0);
        assert_eq!(dispatcher.get_queue(&queue_key)[0].status, ItemStatus::Pending);

        dispatcher.start_queue(&queue_key);
        let event = receiver.await.expect("request resumes");
        assert!(event.response.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_request_holds_it() {
        let mock = MockAdapter::new();
        let command = Command::new("/users");
        mock.intercept(&command, slow(50));
        let dispatcher = dispatcher(DispatcherKind::Fetch, &mock, 1);

        let (request_id, mut receiver) = dispatcher.add_and_wait(command.clone());
        tokio::time::sleep(Duration::from_millis(10)).await;
        dispatcher.stop_request(&request_id);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(receiver.try_recv().is_err());
        assert!(dispatcher.get_queue(&command.queue_key())[0].stopped);

        dispatcher.start_request(&request_id);
        let event = receiver.await.expect("request resumes");
        assert!(event.response.is_success());
        assert_eq!(mock.calls(&command), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_aborts_everything() {
        let mock = MockAdapter::new();
        let users = Command::new("/users");
        let posts = Command::new("/posts");
        mock.intercept(&users, slow(100));
        mock.intercept(&posts, slow(100));
        let dispatcher = dispatcher(DispatcherKind::Fetch, &mock, 1);

        let (_, first) = dispatcher.add_and_wait(users.clone());
        let (_, second) = dispatcher.add_and_wait(posts.clone());
        dispatcher.clear();

        assert!(first.await.expect("resolved").details.is_canceled);
        assert!(second.await.expect("resolved").details.is_canceled);
        assert_eq!(dispatcher.get_queue_request_count(&users.queue_key()), 0);
        assert!(!dispatcher.is_loading(&posts.queue_key()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_offline_tolerant_settles_offline() {
        let mock = MockAdapter::new();
        let command = Command::new("/users").with_offline(false);
        mock.intercept(&command, Interceptor::ok(json!(1)));
        let dispatcher = dispatcher(DispatcherKind::Fetch, &mock, 1);
        dispatcher.inner.app.set_online(false);

        let (_, receiver) = dispatcher.add_and_wait(command.clone());
        let event = receiver.await.expect("settles");

        assert_eq!(event.response, Response::offline());
        assert!(event.details.is_offline);
        assert_eq!(mock.calls(&command), 0);
        assert!(dispatcher.inner.cache.get(&command.cache_key()).is_none());
    }
}
