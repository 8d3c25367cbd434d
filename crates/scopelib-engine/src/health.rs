//! Connection health tracking.
//!
//! The link is declared down after `threshold` consecutive failures and back
//! up after a single success. Only the transitions are reported; the
//! dispatcher turns them into registry alarms and events.

/// Result of recording one exchange outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTransition {
    Unchanged,
    /// The failure threshold was just reached.
    WentDown,
    /// The first success after being down.
    Recovered,
}

/// Consecutive-failure counter with a connected flag.
#[derive(Debug, Clone)]
pub struct ConnectionHealth {
    threshold: u32,
    failures: u32,
    connected: bool,
}

impl ConnectionHealth {
    /// A healthy connection that goes down after `threshold` failures.
    ///
    /// A threshold of zero is treated as one.
    pub fn new(threshold: u32) -> Self {
        ConnectionHealth {
            threshold: threshold.max(1),
            failures: 0,
            connected: true,
        }
    }

    pub fn record_failure(&mut self) -> HealthTransition {
        self.failures = self.failures.saturating_add(1);
        if self.connected && self.failures >= self.threshold {
            self.connected = false;
            HealthTransition::WentDown
        } else {
            HealthTransition::Unchanged
        }
    }

    pub fn record_success(&mut self) -> HealthTransition {
        self.failures = 0;
        if self.connected {
            HealthTransition::Unchanged
        } else {
            self.connected = true;
            HealthTransition::Recovered
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goes_down_at_exact_threshold() {
        let mut h = ConnectionHealth::new(3);
        assert_eq!(h.record_failure(), HealthTransition::Unchanged);
        assert_eq!(h.record_failure(), HealthTransition::Unchanged);
        assert!(h.is_connected());
        assert_eq!(h.record_failure(), HealthTransition::WentDown);
        assert!(!h.is_connected());
        // Further failures do not repeat the transition.
        assert_eq!(h.record_failure(), HealthTransition::Unchanged);
        assert_eq!(h.failures(), 4);
    }

    #[test]
    fn one_success_recovers() {
        let mut h = ConnectionHealth::new(2);
        h.record_failure();
        h.record_failure();
        assert_eq!(h.record_success(), HealthTransition::Recovered);
        assert!(h.is_connected());
        assert_eq!(h.failures(), 0);
        assert_eq!(h.record_success(), HealthTransition::Unchanged);
    }

    #[test]
    fn success_resets_the_count() {
        let mut h = ConnectionHealth::new(3);
        h.record_failure();
        h.record_failure();
        h.record_success();
        assert_eq!(h.record_failure(), HealthTransition::Unchanged);
        assert_eq!(h.record_failure(), HealthTransition::Unchanged);
        assert_eq!(h.record_failure(), HealthTransition::WentDown);
    }

    #[test]
    fn zero_threshold_is_one() {
        let mut h = ConnectionHealth::new(0);
        assert_eq!(h.threshold(), 1);
        assert_eq!(h.record_failure(), HealthTransition::WentDown);
    }
}
