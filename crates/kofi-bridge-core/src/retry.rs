//! Bounded retry with a fixed backoff and a failure classifier.
//!
//! - [`RetryConfig`]: serde-facing parameters (attempt budget, backoff)
//! - [`RetryPolicy`]: the executable policy built from a config
//! - [`Disposition`]: what the classifier decided about a failure
//! - [`RetryOutcome`]: how a retried send ended

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::SendError;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default total send attempts per connection per delivery.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default fixed wait between attempts in milliseconds.
pub const DEFAULT_BACKOFF_MS: u64 = 1000;

/// Retry parameters as they appear in settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Total attempts including the first one (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed delay between attempts in ms (default: 1000).
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_backoff_ms() -> u64 {
    DEFAULT_BACKOFF_MS
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_ms: DEFAULT_BACKOFF_MS,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Classification
// ─────────────────────────────────────────────────────────────────────────────

/// Classifier verdict for a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Wait out the backoff and try again (budget permitting).
    Retry,
    /// Stop immediately; the failure is conclusive.
    Terminal,
}

/// Explicit disconnects are terminal, everything else is retryable.
pub fn default_classifier(error: &SendError) -> Disposition {
    match error {
        SendError::Disconnected => Disposition::Terminal,
        SendError::QueueFull | SendError::Transport(_) => Disposition::Retry,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcome
// ─────────────────────────────────────────────────────────────────────────────

/// How a retried operation ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryOutcome {
    /// An attempt succeeded.
    Delivered {
        /// Attempts made, 1-based.
        attempts: u32,
    },
    /// The classifier short-circuited on a terminal failure.
    Terminal {
        /// Attempts made, 1-based.
        attempts: u32,
        /// The terminal failure.
        error: SendError,
    },
    /// Every attempt in the budget failed with a retryable error.
    Exhausted {
        /// Attempts made (equals the budget).
        attempts: u32,
        /// Failure of the final attempt.
        last_error: SendError,
    },
}

impl RetryOutcome {
    /// Whether the payload got through.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Number of attempts made.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Delivered { attempts }
            | Self::Terminal { attempts, .. }
            | Self::Exhausted { attempts, .. } => *attempts,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Policy
// ─────────────────────────────────────────────────────────────────────────────

/// Executable retry policy: attempt budget, fixed backoff, classifier.
#[derive(Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
    classifier: fn(&SendError) -> Disposition,
}

impl RetryPolicy {
    /// Policy with the default classifier. `max_attempts` is clamped to at least 1.
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            classifier: default_classifier,
        }
    }

    /// Replace the failure classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: fn(&SendError) -> Disposition) -> Self {
        self.classifier = classifier;
        self
    }

    /// Total attempts allowed per operation.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait between attempts.
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Classify a failure.
    pub fn classify(&self, error: &SendError) -> Disposition {
        (self.classifier)(error)
    }

    /// Drive `op` until it succeeds, fails terminally, or the budget runs out.
    ///
    /// `op` receives the 1-based attempt number. The backoff is only slept
    /// between attempts, never after the last one.
    pub async fn run<F, Fut>(&self, mut op: F) -> RetryOutcome
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<(), SendError>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(()) => return RetryOutcome::Delivered { attempts: attempt },
                Err(error) => {
                    if self.classify(&error) == Disposition::Terminal {
                        return RetryOutcome::Terminal {
                            attempts: attempt,
                            error,
                        };
                    }
                    if attempt >= self.max_attempts {
                        return RetryOutcome::Exhausted {
                            attempts: attempt,
                            last_error: error,
                        };
                    }
                    debug!(attempt, error = %error, backoff_ms = self.backoff.as_millis() as u64, "send failed, retrying");
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.backoff_ms))
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
