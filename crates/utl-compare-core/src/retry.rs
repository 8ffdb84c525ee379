//! Retry policy for feed acquisition.

use std::time::Duration;

/// Delay strategy between tries against the same source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed {
        delay: Duration,
    },
    /// `step * attempt`, where `attempt` is the 1-based index of the try that
    /// just failed.
    Linear {
        step: Duration,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Linear {
            step: Duration::from_millis(500),
        }
    }
}

impl Backoff {
    /// Delay to wait after the `attempt`-th failed try (1-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Linear { step } => step.saturating_mul(attempt),
        }
    }
}

/// Per-source retry budget, deadline, and payload floor for feed fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Tries per source; values below 1 are treated as 1.
    pub max_retries: u32,
    /// Deadline for a single try, covering request and body.
    pub timeout: Duration,
    pub backoff: Backoff,
    /// Bodies shorter than this are treated as error pages.
    pub min_payload_bytes: usize,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout: Duration::from_millis(5_000),
            backoff: Backoff::default(),
            min_payload_bytes: 50,
        }
    }
}

impl FetchPolicy {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Tries per source, never zero.
    pub fn tries_per_source(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Delay before the next try, or `None` when `attempt` was the last try
    /// for the source.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.tries_per_source() {
            None
        } else {
            Some(self.backoff.delay(attempt))
        }
    }
}
