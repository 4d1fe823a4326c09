use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::utils::error::{AppError, Result};

/// Spaces requests to the listing site at least `delay` apart, across all
/// concurrent callers.
pub struct Throttle {
    delay: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            next_slot: Mutex::new(None),
        }
    }

    /// Wait for the next free slot, or fail with [`AppError::Cancelled`].
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        if self.delay.is_zero() {
            return Ok(());
        }

        // Reserve a slot, then sleep without holding the lock
        let slot = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next_slot {
                Some(next) if next > now => next,
                _ => now,
            };
            *next_slot = Some(slot + self.delay);
            slot
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            _ = tokio::time::sleep_until(slot) => Ok(()),
        }
    }
}
