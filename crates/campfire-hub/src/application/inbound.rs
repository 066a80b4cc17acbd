//! Admission pipeline for frames arriving on one connection.
//!
//! ```text
//! frame bytes ─▶ rate limiter ─▶ decode ─▶ sender policy ─▶ stamp createdAt ─▶ validate ─▶ Message
//! ```
//!
//! Every stage can reject the frame.  A rejection is never fatal to the
//! connection: the read loop logs it and moves on to the next frame.  Only
//! transport errors close a connection, and those never reach this module.

use chrono::Utc;
use thiserror::Error;

use campfire_core::{decode, validate_with_max, CodecError, Message, ValidationError};

use crate::application::rate_limiter::{RateLimitError, RateLimiter};
use crate::domain::{HubConfig, RateLimitPolicy, SenderPolicy};

/// Why an inbound frame was dropped.
#[derive(Debug, Error)]
pub enum FrameRejection {
    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    #[error("undecodable frame: {0}")]
    Decode(#[from] CodecError),

    #[error("invalid message: {0}")]
    Invalid(#[from] ValidationError),
}

/// Per-connection admission state.  Owned by that connection's read loop.
#[derive(Debug)]
pub struct InboundFilter {
    limiter: RateLimiter,
    policy: RateLimitPolicy,
    wait_timeout: std::time::Duration,
    max_content_len: usize,
    sender_policy: SenderPolicy,
    /// Identity the auth gate attached to the upgrade request, if any.
    identity: Option<String>,
}

impl InboundFilter {
    /// Builds the filter for one connection.  `identity` is the verified
    /// caller extracted during the upgrade.
    pub fn new(config: &HubConfig, identity: Option<String>) -> Self {
        let rl = &config.rate_limit;
        Self {
            limiter: RateLimiter::new(rl.interval, rl.burst),
            policy: rl.policy,
            wait_timeout: rl.wait_timeout,
            max_content_len: config.max_content_len,
            sender_policy: config.sender_policy,
            identity,
        }
    }

    /// Runs one frame through the whole pipeline.
    ///
    /// Under [`RateLimitPolicy::Wait`] this may suspend for up to the
    /// configured wait timeout; it never suspends longer.
    ///
    /// # Errors
    ///
    /// A [`FrameRejection`] naming the stage that refused the frame.
    pub async fn admit(&mut self, bytes: &[u8]) -> Result<Message, FrameRejection> {
        self.acquire_token().await?;

        let msg = decode(bytes)?;
        let msg = self.apply_sender_policy(msg).stamped(Utc::now());
        validate_with_max(&msg, self.max_content_len)?;
        Ok(msg)
    }

    async fn acquire_token(&mut self) -> Result<(), RateLimitError> {
        match self.policy {
            RateLimitPolicy::Wait => self.limiter.wait(self.wait_timeout).await,
            RateLimitPolicy::Drop => {
                if self.limiter.try_acquire() {
                    Ok(())
                } else {
                    Err(RateLimitError::RateExceeded {
                        retry_after: self.limiter.time_until_ready(),
                    })
                }
            }
        }
    }

    fn apply_sender_policy(&self, msg: Message) -> Message {
        match (&self.sender_policy, &self.identity) {
            (SenderPolicy::Override, Some(identity)) => msg.with_sender_id(identity.clone()),
            _ => msg,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
