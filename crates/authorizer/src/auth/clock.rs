//! Time source for token and cache expiry checks.
//!
//! Both the key cache TTL and the `exp`/`nbf`/`iat` checks read time through
//! [`Clock`], so tests can drive expiry deterministically.

/// Source of the current Unix time in seconds.
pub trait Clock: Send + Sync {
    /// Current time as Unix epoch seconds.
    fn now_unix(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}
