//! Environment abstraction for deterministic testing.
//!
//! Decouples session logic from system resources (randomness, wall clock).
//! Tests run against a seeded environment; production uses OS entropy.

/// Abstract environment providing randomness and wall-clock time.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - Given the same seed, a test implementation produces the same sequence
pub trait Environment: Clone + Send + Sync + 'static {
    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Current wall-clock time in milliseconds since the Unix epoch.
    ///
    /// Used only as passthrough message metadata, never in key material.
    fn wall_clock_ms(&self) -> u64;

    /// Generates a random `u64`.
    ///
    /// Convenience for request IDs.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}

/// Production environment using OS entropy and the system clock.
///
/// # Panics
///
/// Panics if the OS RNG fails. This is intentional - a participant
/// without functioning cryptographic randomness cannot establish an
/// identity or encrypt anything, so there is nothing to recover. RNG
/// failure is extremely rare and indicates OS-level issues.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - cannot operate securely");
    }

    #[allow(clippy::expect_used)]
    fn wall_clock_ms(&self) -> u64 {
        let elapsed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("invariant: system clock is after Unix epoch (1970-01-01)");
        u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Deterministic environments for tests.
pub mod test_utils {
    use std::sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    };

    use super::Environment;

    /// Seeded, deterministic environment.
    ///
    /// Random bytes come from a splitmix64 stream; the wall clock ticks
    /// one millisecond per query. Clones share the same stream so a
    /// cloned environment never replays nonces.
    #[derive(Clone)]
    pub struct MockEnv {
        rng_state: Arc<AtomicU64>,
        clock: Arc<AtomicU64>,
    }

    impl MockEnv {
        /// Environment seeded with a fixed default.
        #[must_use]
        pub fn new() -> Self {
            Self::with_seed(0x5ec1_a4e5_eed5_eed5)
        }

        /// Environment with an explicit seed.
        #[must_use]
        pub fn with_seed(seed: u64) -> Self {
            Self {
                rng_state: Arc::new(AtomicU64::new(seed)),
                clock: Arc::new(AtomicU64::new(1_700_000_000_000)),
            }
        }

        fn next_u64(&self) -> u64 {
            // splitmix64
            let mut z = self.rng_state.fetch_add(0x9e37_79b9_7f4a_7c15, Ordering::Relaxed);
            z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
            z ^ (z >> 31)
        }
    }

    impl Default for MockEnv {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Environment for MockEnv {
        fn random_bytes(&self, buffer: &mut [u8]) {
            for chunk in buffer.chunks_mut(8) {
                let bytes = self.next_u64().to_be_bytes();
                chunk.copy_from_slice(&bytes[..chunk.len()]);
            }
        }

        fn wall_clock_ms(&self) -> u64 {
            self.clock.fetch_add(1, Ordering::Relaxed)
        }
    }
}
