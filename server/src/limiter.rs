//! Token bucket limiting how fast one connection may issue commands.

use std::time::Duration;
use tokio::time::{sleep_until, Instant};

#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    burst: u32,
    tokens: u32,
    last_refill: Instant,
}

impl RateLimiter {
    /// Starts full. One token is added every `interval`, up to `burst`.
    pub fn new(interval: Duration, burst: u32) -> Self {
        Self {
            interval,
            burst,
            tokens: burst,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let gained = elapsed.as_nanos() / self.interval.as_nanos().max(1);
        if gained == 0 {
            return;
        }

        let tokens = u128::from(self.tokens) + gained;
        if tokens >= u128::from(self.burst) {
            self.tokens = self.burst;
            self.last_refill = now;
        } else {
            self.tokens = tokens as u32;
            self.last_refill += self.interval * gained as u32;
        }
    }

    /// Takes a token if one is available.
    pub fn try_acquire(&mut self) -> bool {
        self.refill(Instant::now());
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Waits until a token is available and takes it.
    pub async fn acquire(&mut self) {
        while !self.try_acquire() {
            sleep_until(self.last_refill + self.interval).await;
        }
    }

    pub fn available(&self) -> u32 {
        self.tokens
    }
}
