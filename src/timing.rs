//! Half-bit timing
//!
//! Every delay in the crate is a whole or centred half bit-time measured from
//! an anchor instant, so repeated waits do not accumulate drift.

use std::time::Duration;

use tokio::time::{sleep_until, Instant};

/// Half-bit clock anchored at the instant it was started
#[derive(Debug, Clone, Copy)]
pub struct BitClock {
    origin: Instant,
    half_bit: Duration,
}

impl BitClock {
    /// Anchor a clock at the current instant
    pub fn start(half_bit: Duration) -> Self {
        BitClock {
            origin: Instant::now(),
            half_bit,
        }
    }

    /// The anchor instant
    pub fn origin(&self) -> Instant {
        self.origin
    }

    /// Duration of one half bit
    pub fn half_bit(&self) -> Duration {
        self.half_bit
    }

    /// Instant of the boundary `n` half bits after the anchor
    pub fn boundary(&self, n: u32) -> Instant {
        self.origin + self.half_bit * n
    }

    /// Instant in the middle of half bit `n`, counting from zero
    pub fn centre(&self, n: u32) -> Instant {
        self.boundary(n) + self.half_bit / 2
    }

    /// Wait for the end of half bit `n - 1`
    pub async fn wait_boundary(&self, n: u32) {
        sleep_until(self.boundary(n)).await;
    }

    /// Wait for the middle of half bit `n`
    pub async fn wait_centre(&self, n: u32) {
        sleep_until(self.centre(n)).await;
    }
}
