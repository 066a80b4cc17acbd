//! Token-bucket admission control for one connection.
//!
//! # How a token bucket works (for beginners)
//!
//! Picture a bucket that holds at most `burst` tokens and starts full.  Every
//! inbound frame must take one token.  A new token drips in every `interval`.
//! A client can therefore send `burst` frames back-to-back, after which it is
//! held to one frame per `interval` on average.
//!
//! Each connection owns its own [`RateLimiter`], so one noisy peer can only
//! ever drain its own bucket.
//!
//! Time is read from `tokio::time::Instant`, which lets tests freeze and
//! advance the clock deterministically.

use std::time::Duration;

use thiserror::Error;
use tokio::time::{self, Instant};

/// Returned when a frame cannot be admitted in time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// No token is available and the next one is further away than the
    /// caller is willing to wait.
    #[error("rate exceeded; next token in {retry_after:?}")]
    RateExceeded { retry_after: Duration },
}

/// A per-connection token bucket.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    burst: u32,
    tokens: u32,
    /// Instant from which the next token is counted.
    last_refill: Instant,
}

impl RateLimiter {
    /// Creates a full bucket.
    ///
    /// `interval` and `burst` are expected to be non-zero; `HubConfig::check`
    /// enforces that for values coming from configuration.
    pub fn new(interval: Duration, burst: u32) -> Self {
        Self {
            interval,
            burst,
            tokens: burst,
            last_refill: Instant::now(),
        }
    }

    /// Takes a token if one is available right now.  Never suspends.
    pub fn try_acquire(&mut self) -> bool {
        self.refill(Instant::now());
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Time until a token will be available; zero if one is available now.
    pub fn time_until_ready(&mut self) -> Duration {
        let now = Instant::now();
        self.refill(now);
        if self.tokens > 0 {
            Duration::ZERO
        } else {
            self.interval
                .saturating_sub(now.saturating_duration_since(self.last_refill))
        }
    }

    /// Suspends until a token is available, then takes it.
    ///
    /// If the next token is further away than `deadline`, fails immediately
    /// with [`RateLimitError::RateExceeded`] and consumes nothing; there is no
    /// point sleeping for a deadline that is known to expire first.
    ///
    /// # Errors
    ///
    /// [`RateLimitError::RateExceeded`] as described above.
    pub async fn wait(&mut self, deadline: Duration) -> Result<(), RateLimitError> {
        let delay = self.time_until_ready();
        if delay.is_zero() {
            self.tokens -= 1;
            return Ok(());
        }
        if delay > deadline {
            return Err(RateLimitError::RateExceeded { retry_after: delay });
        }

        time::sleep(delay).await;

        self.refill(Instant::now());
        // The sleep covered a full interval since `last_refill`, so at least
        // one token has been earned.
        self.tokens = self.tokens.saturating_sub(1);
        Ok(())
    }

    /// Credits every whole interval elapsed since `last_refill`.
    fn refill(&mut self, now: Instant) {
        if self.tokens >= self.burst {
            // A full bucket does not bank time towards future tokens.
            self.last_refill = now;
            return;
        }
        let elapsed = now.saturating_duration_since(self.last_refill);
        let earned = elapsed.as_nanos() / self.interval.as_nanos().max(1);
        if earned == 0 {
            return;
        }
        let missing = u128::from(self.burst - self.tokens);
        if earned >= missing {
            self.tokens = self.burst;
            self.last_refill = now;
        } else {
            // `earned < missing <= burst`, so it fits in a u32.
            let earned = earned as u32;
            self.tokens += earned;
            self.last_refill += self.interval * earned;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
