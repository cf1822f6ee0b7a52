use std::time::Duration;

use tokio::time::Instant;

/// What the connection loop has to do when a heartbeat deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    SendPing,
    TimedOut,
}

/// Keep-alive bookkeeping of one connection.
///
/// After a ping is sent the peer has `pong_timeout` to answer with any heartbeat frame.
/// An answer cancels the pong deadline and schedules the next ping `ping_timeout` later.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    ping_timeout: Duration,
    pong_timeout: Duration,
    last_ping_sent_at: Option<Instant>,
    last_pong_received_at: Option<Instant>,
    ping_deadline: Option<Instant>,
    pong_deadline: Option<Instant>,
}

impl Heartbeat {
    pub const fn new(ping_timeout: Duration, pong_timeout: Duration) -> Self {
        Self {
            ping_timeout,
            pong_timeout,
            last_ping_sent_at: None,
            last_pong_received_at: None,
            ping_deadline: None,
            pong_deadline: None,
        }
    }

    pub fn ping_sent(&mut self, now: Instant) {
        self.last_ping_sent_at = Some(now);
        self.ping_deadline = None;
        self.pong_deadline = Some(now + self.pong_timeout);
    }

    pub fn heartbeat_received(&mut self, now: Instant) {
        self.last_pong_received_at = Some(now);
        self.pong_deadline = None;
        self.ping_deadline = Some(now + self.ping_timeout);
    }

    /// The earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.ping_deadline, self.pong_deadline) {
            (Some(ping), Some(pong)) => Some(ping.min(pong)),
            (ping, pong) => ping.or(pong),
        }
    }

    /// Returns the action due at `now`. A missed pong wins over a due ping.
    pub fn poll(&self, now: Instant) -> Option<HeartbeatAction> {
        if self.pong_deadline.is_some_and(|deadline| now >= deadline) {
            return Some(HeartbeatAction::TimedOut);
        }
        if self.ping_deadline.is_some_and(|deadline| now >= deadline) {
            return Some(HeartbeatAction::SendPing);
        }
        None
    }

    pub const fn last_ping_sent_at(&self) -> Option<Instant> {
        self.last_ping_sent_at
    }

    pub const fn last_pong_received_at(&self) -> Option<Instant> {
        self.last_pong_received_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PING: Duration = Duration::from_secs(5);
    const PONG: Duration = Duration::from_secs(10);

    #[test]
    fn test_idle_has_no_deadline() {
        let heartbeat = Heartbeat::new(PING, PONG);
        assert_eq!(heartbeat.next_deadline(), None);
        assert_eq!(heartbeat.poll(Instant::now()), None);
    }

    #[test]
    fn test_missing_pong_times_out() {
        let mut heartbeat = Heartbeat::new(PING, PONG);
        let start = Instant::now();
        heartbeat.ping_sent(start);

        assert_eq!(heartbeat.next_deadline(), Some(start + PONG));
        assert_eq!(heartbeat.poll(start + PONG - Duration::from_millis(1)), None);
        assert_eq!(heartbeat.poll(start + PONG), Some(HeartbeatAction::TimedOut));
    }

    #[test]
    fn test_pong_schedules_next_ping() {
        let mut heartbeat = Heartbeat::new(PING, PONG);
        let start = Instant::now();
        heartbeat.ping_sent(start);

        let answered = start + Duration::from_secs(1);
        heartbeat.heartbeat_received(answered);

        assert_eq!(heartbeat.next_deadline(), Some(answered + PING));
        assert_eq!(heartbeat.poll(answered + PING), Some(HeartbeatAction::SendPing));
        assert_eq!(heartbeat.last_pong_received_at(), Some(answered));
        assert_eq!(heartbeat.last_ping_sent_at(), Some(start));
    }

    #[test]
    fn test_ping_sent_clears_ping_deadline() {
        let mut heartbeat = Heartbeat::new(PING, PONG);
        let start = Instant::now();
        heartbeat.heartbeat_received(start);
        heartbeat.ping_sent(start + PING);

        assert_eq!(heartbeat.next_deadline(), Some(start + PING + PONG));
    }
}
