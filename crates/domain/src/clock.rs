//! Injectable time source and ID minting.
//!
//! The orchestrator never calls `Utc::now()` or `Instant::now()` directly —
//! it goes through a [`Clock`] so that tests can drive time manually
//! (interrupt budgets, paused-interval accounting, heartbeats).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};

/// A monotonic + wall-clock time source.
pub trait Clock: Send + Sync {
    /// Wall-clock time, for persisted timestamps.
    fn now(&self) -> DateTime<Utc>;

    /// Milliseconds since an arbitrary fixed origin. Never goes backwards.
    fn monotonic_ms(&self) -> u64;

    /// Milliseconds elapsed since `earlier_ms` (a prior `monotonic_ms`).
    fn elapsed_ms_since(&self, earlier_ms: u64) -> u64 {
        self.monotonic_ms().saturating_sub(earlier_ms)
    }
}

/// Production clock backed by `Instant` for monotonic reads.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Test clock advanced explicitly with [`ManualClock::advance_ms`].
pub struct ManualClock {
    base: DateTime<Utc>,
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Utc::now(),
            now_ms: AtomicU64::new(0),
        }
    }

    pub fn advance_ms(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + chrono::Duration::milliseconds(self.now_ms.load(Ordering::SeqCst) as i64)
    }

    fn monotonic_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Mints opaque, collision-resistant identifiers.
///
/// IDs carry a zero-padded per-generator counter so that IDs minted by the
/// same session sort lexically in creation order; the uuid tail guards
/// against collisions across generators.
pub struct IdGen {
    counter: AtomicU64,
}

impl IdGen {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Mint the next ID with the given kind prefix, e.g. `iv-00000001-9f2c…`.
    pub fn next(&self, kind: &str) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let tail = uuid::Uuid::new_v4().simple().to_string();
        format!("{kind}-{seq:08x}-{}", &tail[..12])
    }
}

impl Default for IdGen {
    fn default() -> Self {
        Self::new()
    }
}
