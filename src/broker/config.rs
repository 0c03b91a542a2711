//! Broker configuration.

use std::time::Duration;

use crate::config::{DEFAULT_INBOX, DEFAULT_POLL_INTERVAL};

/// Slack added to the poll interval to form the per-iteration deadline.
const DEADLINE_SLACK: Duration = Duration::from_secs(1);

/// What one Broker polls and how long it waits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    inbox: String,
    poll_interval: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_INBOX, DEFAULT_POLL_INTERVAL)
    }
}

impl BrokerConfig {
    pub fn new(inbox: impl Into<String>, poll_interval: Duration) -> Self {
        BrokerConfig {
            inbox: inbox.into(),
            poll_interval,
        }
    }

    pub fn inbox(&self) -> &str {
        &self.inbox
    }

    /// Upper bound on one blocking dequeue.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Fail-safe deadline for a whole iteration: `poll_interval + 1s`.
    pub fn iteration_deadline(&self) -> Duration {
        self.poll_interval + DEADLINE_SLACK
    }

    /// The one-slot recovery list, `<inbox>:in_progress`.
    pub fn in_progress_queue(&self) -> String {
        format!("{}:in_progress", self.inbox)
    }

    /// Dead-letter list for payloads that are not valid envelopes.
    pub fn malformed_queue(&self) -> String {
        format!("{}:malformed", self.inbox)
    }
}
