use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::command::Command;
use crate::request_id::RequestId;
use crate::response::ResponseEvent;

/// Where a queued request currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    /// Waiting for a concurrency slot, or stopped.
    Pending,
    /// An attempt is being sent.
    InFlight,
    /// The last attempt failed and the next one is scheduled.
    RetryScheduled,
    /// Held until the client is online again.
    WaitingOnline,
}

impl ItemStatus {
    /// Every status except `Pending` occupies a concurrency slot.
    pub const fn is_running(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Snapshot of a request held by a dispatcher queue.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub request_id: RequestId,
    pub command: Arc<Command>,
    pub queue_key: String,
    pub retries: u32,
    pub timestamp: DateTime<Utc>,
    pub stopped: bool,
    pub status: ItemStatus,
}

pub(super) struct Entry {
    pub(super) item: QueueItem,
    pub(super) cancel: CancellationToken,
    pub(super) waiters: Vec<oneshot::Sender<ResponseEvent>>,
}

impl Entry {
    pub(super) fn new(
        request_id: RequestId,
        command: Arc<Command>,
        queue_key: String,
        waiter: oneshot::Sender<ResponseEvent>,
    ) -> Self {
        Self {
            item: QueueItem {
                request_id,
                command,
                queue_key,
                retries: 0,
                timestamp: Utc::now(),
                stopped: false,
                status: ItemStatus::Pending,
            },
            cancel: CancellationToken::new(),
            waiters: vec![waiter],
        }
    }

    /// Cancels the running attempt and puts the entry back to `Pending` with a fresh token.
    pub(super) fn interrupt(&mut self) {
        if self.item.status.is_running() {
            self.cancel.cancel();
            self.cancel = CancellationToken::new();
            self.item.status = ItemStatus::Pending;
        }
    }
}

/// FIFO of requests sharing a queue key.
#[derive(Default)]
pub(super) struct Queue {
    pub(super) entries: VecDeque<Entry>,
    pub(super) stopped: bool,
}

impl Queue {
    pub(super) fn running_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.item.status.is_running())
            .count()
    }

    pub(super) fn get_mut(&mut self, request_id: &RequestId) -> Option<&mut Entry> {
        self.entries
            .iter_mut()
            .find(|entry| entry.item.request_id == *request_id)
    }

    pub(super) fn remove(&mut self, request_id: &RequestId) -> Option<Entry> {
        let position = self
            .entries
            .iter()
            .position(|entry| entry.item.request_id == *request_id)?;
        self.entries.remove(position)
    }

    /// Marks pending entries in-flight until `concurrency` slots are used.
    ///
    /// Returns what must be spawned: request id, command, retries so far and token.
    pub(super) fn take_startable(
        &mut self,
        concurrency: usize,
    ) -> Vec<(RequestId, Arc<Command>, u32, CancellationToken)> {
        if self.stopped {
            return Vec::new();
        }
        let mut free = concurrency.saturating_sub(self.running_count());
        let mut started = Vec::new();
        for entry in &mut self.entries {
            if free == 0 {
                break;
            }
            if entry.item.stopped || entry.item.status.is_running() {
                continue;
            }
            entry.item.status = ItemStatus::InFlight;
            started.push((
                entry.item.request_id.clone(),
                Arc::clone(&entry.item.command),
                entry.item.retries,
                entry.cancel.clone(),
            ));
            free -= 1;
        }
        started
    }
}
