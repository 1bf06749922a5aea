//! Time source for credential expiry.

use chrono::{DateTime, Utc};

/// Time provider abstraction so expiry boundaries can be tested deterministically.
pub trait TimeProvider: Send + Sync {
    /// Get the current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
