//! Per-provider request rate limiting.
//!
//! The gateway is shared across sessions; a [`RateGate`] in front of each
//! provider keeps the fleet of debates inside the provider's global rate
//! limit. Token-bucket semantics: bursts up to `capacity`, steady state at
//! `refill_per_sec`.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub struct RateGate {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<GateState>,
}

struct GateState {
    tokens: f64,
    last_refill: Instant,
}

impl RateGate {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            capacity: capacity as f64,
            refill_per_sec,
            state: Mutex::new(GateState {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, state: &mut GateState) {
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = Instant::now();
    }

    /// Take one token if available.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Wait until a token is available, then take it.
    pub async fn acquire(&self) {
        loop {
            let wait_ms = {
                let mut state = self.state.lock();
                self.refill(&mut state);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                // Time until one token refills.
                ((1.0 - state.tokens) / self.refill_per_sec * 1000.0).ceil() as u64
            };
            tokio::time::sleep(Duration::from_millis(wait_ms.max(10))).await;
        }
    }
}
