/// Epoch-millisecond clock, abstracted so tests can advance time
/// deterministically instead of racing the wall clock.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Production clock backed by the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis() as u64
    }
}

/// Deterministic clock for tests: starts at a fixed instant and only moves
/// when told to.
#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::Clock;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Debug)]
    pub struct FakeClock {
        now_ms: AtomicU64,
    }

    impl FakeClock {
        pub fn new(start_ms: u64) -> Self {
            Self {
                now_ms: AtomicU64::new(start_ms),
            }
        }

        pub fn advance_ms(&self, delta_ms: u64) {
            self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
        }
    }

    impl Clock for FakeClock {
        fn now_ms(&self) -> u64 {
            self.now_ms.load(Ordering::SeqCst)
        }
    }
}
