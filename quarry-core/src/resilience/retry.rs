//! Bounded-attempt retry with exponential backoff.
//!
//! The attempt bookkeeping is a plain state machine ([`RetryState`]) so it
//! can be tested without time; waiting goes through the injectable [`Delay`].

use async_trait::async_trait;
use rand::Rng;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::RetryConfig;

/// Source of the random component added to each backoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Jitter {
    /// Uniform in [0, 1) seconds.
    Random,
    /// Fixed offset in seconds, for deterministic tests.
    Fixed(f64),
    None,
}

impl Jitter {
    fn sample(&self) -> f64 {
        match self {
            Jitter::Random => rand::thread_rng().gen_range(0.0..1.0),
            Jitter::Fixed(value) => value.clamp(0.0, 0.999_999),
            Jitter::None => 0.0,
        }
    }
}

/// Retry limits and backoff shape.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub max_delay: Duration,
    pub jitter: Jitter,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            max_delay: Duration::from_secs_f64(config.max_delay_secs.max(0.0)),
            jitter: if config.jitter {
                Jitter::Random
            } else {
                Jitter::None
            },
        }
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// `min(2^attempt + jitter, max_delay)` for the zero-based failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponential = 2f64.powi(attempt.min(30) as i32);
        let secs = (exponential + self.jitter.sample()).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

/// What to do after a transient failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryStep {
    /// Wait `delay`, then make attempt number `attempt` (zero-based).
    Retry { attempt: u32, delay: Duration },
    /// No attempts left; `attempts` were made in total.
    GiveUp { attempts: u32 },
}

/// Attempt counter for one call.
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Zero-based index of the attempt in flight.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Advance after the current attempt failed transiently.
    pub fn on_transient_failure(&mut self) -> RetryStep {
        let failed = self.attempt;
        if failed + 1 >= self.policy.max_attempts {
            return RetryStep::GiveUp {
                attempts: failed + 1,
            };
        }
        self.attempt += 1;
        RetryStep::Retry {
            attempt: self.attempt,
            delay: self.policy.backoff(failed),
        }
    }
}

/// Injectable wait used between retries.
#[async_trait]
pub trait Delay: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real waiting on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns immediately and remembers every requested delay.
#[derive(Debug, Default)]
pub struct RecordingDelay {
    requested: Mutex<Vec<Duration>>,
}

impl RecordingDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requested(&self) -> Vec<Duration> {
        self.requested
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Delay for RecordingDelay {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut requested) = self.requested.lock() {
            requested.push(duration);
        }
    }
}
