// src/retry.rs
//! Shared back-off helper used by the fetcher (linear schedule) and the
//! enrichment client (exponential schedule). Jitter keeps herds of retries
//! from synchronising on upstream recovery.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy)]
enum Schedule {
    /// `step_ms · attempt`
    Linear { step_ms: u64 },
    /// `min(base_ms · 2^attempt, cap_ms)`
    Exponential { base_ms: u64, cap_ms: u64 },
}

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    schedule: Schedule,
    jitter_ms: u64,
}

impl Backoff {
    pub fn linear(step_ms: u64, jitter_ms: u64) -> Self {
        Self {
            schedule: Schedule::Linear { step_ms },
            jitter_ms,
        }
    }

    pub fn exponential(base_ms: u64, cap_ms: u64, jitter_ms: u64) -> Self {
        Self {
            schedule: Schedule::Exponential { base_ms, cap_ms },
            jitter_ms,
        }
    }

    /// Deterministic part of the delay. `attempt` counts failures so far:
    /// the linear schedule starts at 1, the exponential one at 0.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let ms = match self.schedule {
            Schedule::Linear { step_ms } => step_ms.saturating_mul(attempt as u64),
            Schedule::Exponential { base_ms, cap_ms } => {
                let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
                base_ms.saturating_mul(factor).min(cap_ms)
            }
        };
        Duration::from_millis(ms)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter_ms > 0 {
            rand::rng().random_range(0..self.jitter_ms)
        } else {
            0
        };
        self.base_delay(attempt) + Duration::from_millis(jitter)
    }

    pub async fn sleep(&self, attempt: u32) {
        tokio::time::sleep(self.delay(attempt)).await;
    }
}
