//! Run-wide circuit breaker for search failures.
//!
//! Unlike a provider breaker there is no half-open recovery: once tripped,
//! the run stays degraded.

use tracing::warn;

use crate::config::BreakerConfig;

/// Why the breaker tripped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TripReason {
    ConsecutiveFailures { count: usize },
    FailureRatio { failed: usize, total: usize },
}

impl std::fmt::Display for TripReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TripReason::ConsecutiveFailures { count } => {
                write!(f, "{} consecutive search failures", count)
            }
            TripReason::FailureRatio { failed, total } => {
                write!(f, "{} of {} searches failed", failed, total)
            }
        }
    }
}

/// State of the search breaker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BreakerState {
    /// Searches are permitted.
    Closed,
    /// Searches are skipped for the rest of the run.
    Tripped(TripReason),
}

/// Counts search outcomes across a run and trips on sustained failure.
#[derive(Debug)]
pub struct SearchCircuitBreaker {
    state: BreakerState,
    consecutive: usize,
    total: usize,
    failed: usize,
    consecutive_threshold: usize,
    ratio_threshold: f64,
    min_samples: usize,
}

impl SearchCircuitBreaker {
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive: 0,
            total: 0,
            failed: 0,
            consecutive_threshold: config.consecutive_failures.max(1),
            ratio_threshold: config.failure_ratio,
            min_samples: config.min_samples,
        }
    }

    /// Whether a search may be attempted.
    pub fn is_call_permitted(&self) -> bool {
        self.state == BreakerState::Closed
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Queries counted so far, and how many of them failed.
    pub fn totals(&self) -> (usize, usize) {
        (self.total, self.failed)
    }

    /// Record a query that produced results.
    ///
    /// The failure ratio is re-evaluated, so a success can still trip it.
    pub fn record_success(&mut self) -> Option<TripReason> {
        self.total += 1;
        self.consecutive = 0;
        self.evaluate()
    }

    /// Record a failed query. Returns the reason if this call tripped the breaker.
    pub fn record_failure(&mut self) -> Option<TripReason> {
        self.total += 1;
        self.failed += 1;
        self.consecutive += 1;
        self.evaluate()
    }

    fn evaluate(&mut self) -> Option<TripReason> {
        if !self.is_call_permitted() {
            return None;
        }
        let reason = if self.consecutive >= self.consecutive_threshold {
            Some(TripReason::ConsecutiveFailures {
                count: self.consecutive,
            })
        } else if self.total >= self.min_samples
            && self.total > 0
            && self.failed as f64 / self.total as f64 >= self.ratio_threshold
        {
            Some(TripReason::FailureRatio {
                failed: self.failed,
                total: self.total,
            })
        } else {
            None
        };

        if let Some(reason) = reason {
            warn!(
                failed = self.failed,
                total = self.total,
                consecutive = self.consecutive,
                %reason,
                "Search circuit breaker tripped; entering degraded mode"
            );
            self.state = BreakerState::Tripped(reason);
        }
        reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> SearchCircuitBreaker {
        SearchCircuitBreaker::new(&BreakerConfig::default())
    }

    #[test]
    fn test_starts_closed() {
        let b = breaker();
        assert!(b.is_call_permitted());
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[test]
    fn test_trips_after_three_consecutive_failures() {
        let mut b = breaker();
        assert_eq!(b.record_failure(), None);
        assert_eq!(b.record_failure(), None);
        assert_eq!(
            b.record_failure(),
            Some(TripReason::ConsecutiveFailures { count: 3 })
        );
        assert!(!b.is_call_permitted());
    }

    #[test]
    fn test_success_resets_consecutive_count() {
        let mut b = SearchCircuitBreaker::new(&BreakerConfig {
            min_samples: 100,
            ..Default::default()
        });
        b.record_failure();
        b.record_failure();
        b.record_success();
        b.record_failure();
        assert_eq!(b.record_failure(), None);
        assert!(b.is_call_permitted());
    }

    #[test]
    fn test_ratio_counts_successful_queries_too() {
        let mut b = breaker();
        b.record_failure();
        b.record_success();
        b.record_failure();
        b.record_success();
        assert_eq!(
            b.state(),
            BreakerState::Tripped(TripReason::FailureRatio {
                failed: 2,
                total: 4
            })
        );
    }

    #[test]
    fn test_ratio_ignored_below_min_samples() {
        let mut b = breaker();
        b.record_success();
        assert_eq!(b.record_failure(), None);
        assert_eq!(b.totals(), (2, 1));
        assert!(b.is_call_permitted());
    }

    #[test]
    fn test_trips_on_half_failed_after_four_queries() {
        let mut b = breaker();
        b.record_success();
        b.record_failure();
        b.record_success();
        assert_eq!(
            b.record_failure(),
            Some(TripReason::FailureRatio {
                failed: 2,
                total: 4
            })
        );
    }

    #[test]
    fn test_trip_is_sticky() {
        let mut b = breaker();
        b.record_failure();
        b.record_failure();
        b.record_failure();
        for _ in 0..10 {
            b.record_success();
        }
        assert!(!b.is_call_permitted());
        assert_eq!(b.record_failure(), None);
    }

    #[test]
    fn test_trip_reason_display() {
        let reason = TripReason::FailureRatio {
            failed: 3,
            total: 5,
        };
        assert_eq!(reason.to_string(), "3 of 5 searches failed");
    }
}
