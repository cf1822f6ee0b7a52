/// Configuration for a single dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// How many requests of one queue may be in flight at the same time.
    ///
    /// `1` gives strict FIFO execution per queue key, which is what mutations need.
    /// Values of `0` are treated as `1`.
    pub concurrency: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

impl DispatcherConfig {
    #[must_use]
    pub const fn new(concurrency: usize) -> Self {
        Self { concurrency }
    }

    pub(crate) const fn effective_concurrency(&self) -> usize {
        if self.concurrency == 0 {
            1
        } else {
            self.concurrency
        }
    }
}

/// Configuration for a [`Client`](crate::client::Client).
///
/// The fetch and submit dispatchers have independent concurrency policies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    pub fetch: DispatcherConfig,
    pub submit: DispatcherConfig,
}

impl ClientConfig {
    #[must_use]
    pub const fn new(fetch: DispatcherConfig, submit: DispatcherConfig) -> Self {
        Self { fetch, submit }
    }
}
