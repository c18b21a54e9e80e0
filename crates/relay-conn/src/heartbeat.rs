//! Heartbeat tracking for the bridge connection.
//!
//! Monitors connection health by tracking ping/reply timing and
//! message activity.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

/// Heartbeat monitor for connection health.
pub struct HeartbeatMonitor {
    /// Reply must arrive within this many milliseconds of a ping.
    timeout_ms: u64,
    /// Last ping sent time.
    last_ping: RwLock<Option<DateTime<Utc>>>,
    /// Last heartbeat reply received time.
    last_reply: RwLock<Option<DateTime<Utc>>>,
    /// Last message received time (any envelope).
    last_message: RwLock<DateTime<Utc>>,
    /// Whether we're waiting for a reply to an outstanding ping.
    awaiting_reply: RwLock<bool>,
}

impl HeartbeatMonitor {
    /// Create a new heartbeat monitor.
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            last_ping: RwLock::new(None),
            last_reply: RwLock::new(None),
            last_message: RwLock::new(Utc::now()),
            awaiting_reply: RwLock::new(false),
        }
    }

    /// Reset state (called on connection establishment).
    pub fn reset(&self) {
        *self.last_ping.write() = None;
        *self.last_reply.write() = None;
        *self.last_message.write() = Utc::now();
        *self.awaiting_reply.write() = false;
    }

    /// Record that a ping was sent.
    pub fn record_ping(&self) {
        let now = Utc::now();
        *self.last_ping.write() = Some(now);
        *self.awaiting_reply.write() = true;
        debug!(time = %now, "Recorded heartbeat ping");
    }

    /// Record that a heartbeat reply was received.
    pub fn record_reply(&self) {
        let now = Utc::now();
        *self.last_reply.write() = Some(now);
        *self.awaiting_reply.write() = false;

        if let Some(ping_time) = *self.last_ping.read() {
            let rtt_ms = (now - ping_time).num_milliseconds();
            debug!(rtt_ms, "Received heartbeat reply");
        }
    }

    /// Record that any envelope was received.
    pub fn record_message(&self) {
        *self.last_message.write() = Utc::now();
    }

    /// Whether an outstanding ping is still unanswered.
    pub fn awaiting_reply(&self) -> bool {
        *self.awaiting_reply.read()
    }

    /// Whether the outstanding ping has gone unanswered past the timeout.
    pub fn is_timed_out(&self) -> bool {
        if !*self.awaiting_reply.read() {
            return false;
        }

        if let Some(ping_time) = *self.last_ping.read() {
            let elapsed_ms = (Utc::now() - ping_time).num_milliseconds();
            return elapsed_ms > self.timeout_ms as i64;
        }

        false
    }

    /// Time of the last heartbeat reply, if any.
    pub fn last_heartbeat_at(&self) -> Option<DateTime<Utc>> {
        *self.last_reply.read()
    }

    /// Milliseconds since the last received envelope.
    pub fn time_since_last_message_ms(&self) -> i64 {
        (Utc::now() - *self.last_message.read()).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let hb = HeartbeatMonitor::new(10000);
        assert!(!hb.is_timed_out());
        assert!(!hb.awaiting_reply());
        assert!(hb.last_heartbeat_at().is_none());
    }

    #[test]
    fn test_ping_reply_cycle() {
        let hb = HeartbeatMonitor::new(10000);

        hb.record_ping();
        assert!(hb.awaiting_reply());

        hb.record_reply();
        assert!(!hb.awaiting_reply());
        assert!(hb.last_heartbeat_at().is_some());
    }

    #[test]
    fn test_zero_timeout_times_out_immediately() {
        let hb = HeartbeatMonitor::new(0);
        hb.record_ping();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(hb.is_timed_out());
    }

    #[test]
    fn test_reset_clears_outstanding_ping() {
        let hb = HeartbeatMonitor::new(0);
        hb.record_ping();
        hb.reset();
        assert!(!hb.awaiting_reply());
        assert!(!hb.is_timed_out());
    }
}
