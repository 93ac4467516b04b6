//! Circuit breaker over a single model id or tool name.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Internal breaker state.
#[derive(Debug, Clone, Copy)]
enum CircuitState {
    /// Calls flow; consecutive failures are counted.
    Closed { failures: u32 },
    /// Calls fail fast until the cooldown elapses.
    Open { until: Instant },
    /// One probe call is in flight.
    HalfOpen,
}

/// A circuit breaker: after `failure_threshold` consecutive failures the
/// circuit opens for `cooldown`, failing calls fast. After the cooldown a
/// single probe is admitted; its result closes or re-opens the circuit.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    state: Mutex<CircuitState>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(30))
    }
}

impl CircuitBreaker {
    /// Create a breaker tripping after `failure_threshold` consecutive
    /// failures and cooling down for `cooldown`.
    #[must_use]
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            state: Mutex::new(CircuitState::Closed { failures: 0 }),
        }
    }

    /// Whether a call may proceed right now. Transitions Open → HalfOpen
    /// when the cooldown has elapsed, admitting exactly one probe.
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match *state {
            CircuitState::Closed { .. } => true,
            CircuitState::Open { until } => {
                if Instant::now() >= until {
                    *state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => false,
        }
    }

    /// Record a successful call, closing the circuit.
    pub fn record_success(&self) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *state = CircuitState::Closed { failures: 0 };
    }

    /// Record a failed call, tripping the circuit at the threshold or on a
    /// failed probe.
    pub fn record_failure(&self) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *state = match *state {
            CircuitState::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.failure_threshold {
                    CircuitState::Open {
                        until: Instant::now() + self.cooldown,
                    }
                } else {
                    CircuitState::Closed { failures }
                }
            }
            CircuitState::HalfOpen | CircuitState::Open { .. } => CircuitState::Open {
                until: Instant::now() + self.cooldown,
            },
        };
    }

    /// Whether the circuit is currently open (failing fast).
    #[must_use]
    pub fn is_open(&self) -> bool {
        let state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        matches!(*state, CircuitState::Open { until } if Instant::now() < until)
    }
}
