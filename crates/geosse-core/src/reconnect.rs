//! Reconnect policy applied when a connection signals an error.
//!
//! Only the ready state is inspected. A `closed` connection will never
//! recover on its own, so the layer opens a new one; a `connecting` or
//! `open` connection is left to the transport's own retry loop.

use std::time::Duration;

use geosse_types::ReadyState;

/// What the layer should do after an error signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Open a new connection with the same subscription options.
    Reconnect {
        /// Wait this long first.
        delay: Duration,
    },
    /// Leave the connection alone.
    Wait,
}

/// Reconnect policy: no backoff, no retry limit, no jitter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconnectPolicy {
    delay: Duration,
}

impl ReconnectPolicy {
    /// Reconnect as soon as the connection is closed.
    pub const fn immediate() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }

    /// Reconnect after a fixed delay.
    pub const fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }

    /// Decide based on the ready state observed with the error.
    pub const fn on_error(&self, state: ReadyState) -> ReconnectDecision {
        match state {
            ReadyState::Closed => ReconnectDecision::Reconnect { delay: self.delay },
            ReadyState::Connecting | ReadyState::Open => ReconnectDecision::Wait,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_triggers_reconnect() {
        let policy = ReconnectPolicy::immediate();
        assert_eq!(
            policy.on_error(ReadyState::Closed),
            ReconnectDecision::Reconnect {
                delay: Duration::ZERO
            }
        );
    }

    #[test]
    fn live_states_wait() {
        let policy = ReconnectPolicy::with_delay(Duration::from_secs(1));
        assert_eq!(policy.on_error(ReadyState::Open), ReconnectDecision::Wait);
        assert_eq!(policy.on_error(ReadyState::Connecting), ReconnectDecision::Wait);
    }

    #[test]
    fn delay_is_carried() {
        let policy = ReconnectPolicy::with_delay(Duration::from_millis(500));
        assert_eq!(
            policy.on_error(ReadyState::Closed),
            ReconnectDecision::Reconnect {
                delay: Duration::from_millis(500)
            }
        );
    }
}
