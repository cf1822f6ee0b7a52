use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::request_id::RequestId;

#[derive(Debug, Clone)]
struct Latest {
    request_id: RequestId,
    registered_at: Instant,
}

/// Latest live request per queue key, for deduplicating identical fetches.
#[derive(Debug, Default)]
pub(super) struct DedupTable {
    latest: HashMap<String, Latest>,
}

impl DedupTable {
    /// Returns the request a new one may attach to.
    ///
    /// With a window, the latest request must have been registered at most `window` ago.
    /// Without one, any registered request qualifies.
    pub(super) fn lookup(
        &self,
        queue_key: &str,
        window: Option<Duration>,
        now: Instant,
    ) -> Option<&RequestId> {
        let latest = self.latest.get(queue_key)?;
        let within = window.is_none_or(|window| {
            now.saturating_duration_since(latest.registered_at) <= window
        });
        within.then_some(&latest.request_id)
    }

    pub(super) fn register(&mut self, queue_key: String, request_id: RequestId, now: Instant) {
        self.latest.insert(
            queue_key,
            Latest {
                request_id,
                registered_at: now,
            },
        );
    }

    /// Forgets `request_id` if it is still the latest request of `queue_key`.
    pub(super) fn release(&mut self, queue_key: &str, request_id: &RequestId) {
        if self
            .latest
            .get(queue_key)
            .is_some_and(|latest| latest.request_id == *request_id)
        {
            self.latest.remove(queue_key);
        }
    }

    pub(super) fn clear(&mut self) {
        self.latest.clear();
    }
}
