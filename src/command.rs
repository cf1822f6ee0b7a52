//! Request descriptors.
//!
//! A [`Command`] describes one request: endpoint template, method, headers, params,
//! payload, and the dispatching options (retries, deduplication, offline handling,
//! caching). It never performs I/O itself; it is handed to a
//! [`Dispatcher`](crate::dispatcher::Dispatcher) which executes it through the
//! client's [`Adapter`](crate::adapter::Adapter).
//!
//! Commands are immutable by convention: every `with_*` setter consumes the command and
//! returns the modified value.
//!
//! # Keys
//!
//! - [`Command::cache_key`] identifies a resource representation. Observers with equal
//!   cache keys share cached state.
//! - [`Command::queue_key`] identifies an execution lane. Requests with equal queue keys
//!   are ordered together and may be deduplicated.
//! - [`Command::abort_key`] groups requests cancelled together by
//!   [`Client::abort_by_key`](crate::client::Client::abort_by_key).
//!
//! # Examples
//!
//! ```
//! use hyperflow::command::{Command, Method};
//! use std::time::Duration;
//!
//! let command = Command::new("/users/:id")
//!     .with_param("id", 7)
//!     .with_query_param("include", "posts")
//!     .with_retry(2)
//!     .with_retry_time(Duration::from_millis(100));
//!
//! assert_eq!(command.endpoint(), "/users/7");
//! assert_eq!(command.method(), Method::Get);
//! assert_eq!(command.cache_key(), "GET_/users/7_?include=posts");
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTP method of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    endpoint: String,
    method: Method,
    headers: BTreeMap<String, String>,
    params: BTreeMap<String, String>,
    query_params: BTreeMap<String, String>,
    data: Option<Value>,
    retry: u32,
    retry_time: Duration,
    deduplicate: bool,
    deduplicate_time: Option<Duration>,
    offline: bool,
    cancelable: bool,
    cache: bool,
    cache_time: Duration,
    stale_time: Duration,
    cache_key: Option<String>,
    queue_key: Option<String>,
    abort_key: Option<String>,
}

impl Command {
    /// Creates a `GET` command for the given endpoint template.
    ///
    /// Segments starting with `:` are path parameters filled by [`Command::with_param`].
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: Method::Get,
            headers: BTreeMap::new(),
            params: BTreeMap::new(),
            query_params: BTreeMap::new(),
            data: None,
            retry: 0,
            retry_time: Duration::from_millis(500),
            deduplicate: false,
            deduplicate_time: None,
            offline: true,
            cancelable: false,
            cache: true,
            cache_time: Duration::from_secs(5 * 60),
            stale_time: Duration::from_secs(5 * 60),
            cache_key: None,
            queue_key: None,
            abort_key: None,
        }
    }

    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    #[must_use]
    pub fn with_query_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query_params.insert(name.into(), value.to_string());
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Number of additional attempts after a failed send.
    #[must_use]
    pub const fn with_retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub const fn with_retry_time(mut self, retry_time: Duration) -> Self {
        self.retry_time = retry_time;
        self
    }

    /// Collapses concurrent fetches sharing a queue key into one send.
    #[must_use]
    pub const fn with_deduplicate(mut self, deduplicate: bool) -> Self {
        self.deduplicate = deduplicate;
        self
    }

    /// Window, measured from the first call, during which calls are collapsed.
    ///
    /// Without a window, calls collapse for as long as the first one is in flight.
    #[must_use]
    pub const fn with_deduplicate_time(mut self, deduplicate_time: Duration) -> Self {
        self.deduplicate_time = Some(deduplicate_time);
        self
    }

    /// Holds failed sends while the client is offline and resumes once it is back online.
    #[must_use]
    pub const fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// New requests in the same queue abort the earlier ones.
    #[must_use]
    pub const fn with_cancelable(mut self, cancelable: bool) -> Self {
        self.cancelable = cancelable;
        self
    }

    #[must_use]
    pub const fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub const fn with_cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time = cache_time;
        self
    }

    #[must_use]
    pub const fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    #[must_use]
    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_queue_key(mut self, key: impl Into<String>) -> Self {
        self.queue_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_abort_key(mut self, key: impl Into<String>) -> Self {
        self.abort_key = Some(key.into());
        self
    }

    /// The endpoint with path parameters substituted.
    ///
    /// Parameters without a value are left in place.
    pub fn endpoint(&self) -> String {
        self.endpoint
            .split('/')
            .map(|segment| match segment.strip_prefix(':') {
                Some(name) => self
                    .params
                    .get(name)
                    .map_or(segment, String::as_str),
                None => segment,
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn endpoint_template(&self) -> &str {
        &self.endpoint
    }

    pub const fn method(&self) -> Method {
        self.method
    }

    pub const fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub const fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub const fn query_params(&self) -> &BTreeMap<String, String> {
        &self.query_params
    }

    /// Query parameters serialized in key order, including the leading `?`.
    ///
    /// Returns an empty string when there are no query parameters.
    pub fn query_string(&self) -> String {
        if self.query_params.is_empty() {
            return String::new();
        }
        let pairs: Vec<String> = self
            .query_params
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        format!("?{}", pairs.join("&"))
    }

    pub const fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub const fn retry(&self) -> u32 {
        self.retry
    }

    pub const fn retry_time(&self) -> Duration {
        self.retry_time
    }

    pub const fn deduplicate(&self) -> bool {
        self.deduplicate
    }

    pub const fn deduplicate_time(&self) -> Option<Duration> {
        self.deduplicate_time
    }

    pub const fn offline(&self) -> bool {
        self.offline
    }

    pub const fn cancelable(&self) -> bool {
        self.cancelable
    }

    pub const fn cache(&self) -> bool {
        self.cache
    }

    pub const fn cache_time(&self) -> Duration {
        self.cache_time
    }

    pub const fn stale_time(&self) -> Duration {
        self.stale_time
    }

    pub fn cache_key(&self) -> String {
        self.cache_key
            .clone()
            .unwrap_or_else(|| self.default_key())
    }

    pub fn queue_key(&self) -> String {
        self.queue_key
            .clone()
            .unwrap_or_else(|| self.default_key())
    }

    pub fn abort_key(&self) -> String {
        self.abort_key
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.method, self.endpoint))
    }

    fn default_key(&self) -> String {
        format!("{}_{}_{}", self.method, self.endpoint(), self.query_string())
    }
}
