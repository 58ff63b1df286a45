//! # Ledger Testing
//!
//! Testing utilities for the wallet ledger.
//!
//! This crate provides:
//! - A fixed [`Clock`] for deterministic timestamps
//! - [`InMemoryLedger`]: a unit-of-work backend with staged writes and fault
//!   injection
//! - [`InMemoryEventBus`]: a broker double that records publishes and feeds
//!   subscribers
//! - [`InMemoryBalanceStore`] and [`InMemoryOutbox`]
//! - [`RecordingHandler`] for asserting dispatch order
//!
//! ## Example
//!
//! ```ignore
//! use ledger_testing::{InMemoryLedger, test_clock};
//!
//! #[tokio::test]
//! async fn transfer_commits() {
//!     let ledger = InMemoryLedger::new();
//!     let uow = ledger.unit_of_work();
//!     let (alice, bob) = ledger.seed_pair(dec!(100), dec!(0));
//!     // ... run a use case against `uow`
//!     assert_eq!(ledger.account(alice).unwrap().balance(), dec!(60));
//! }
//! ```

use chrono::{DateTime, Utc};
use ledger_core::environment::Clock;

pub mod event_bus;
pub mod handlers;
pub mod ledger;
pub mod outbox;
pub mod projection_mocks;

/// Mock implementations of environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a fixed clock at 2025-01-01 00:00:00 UTC
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Test helpers
pub mod helpers {
    /// Install a `tracing` subscriber that writes through the test harness.
    ///
    /// Safe to call from every test; only the first call installs.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use event_bus::{InMemoryEventBus, PublishedMessage};
pub use handlers::{CallLog, FailingHandler, RecordingHandler};
pub use helpers::init_test_tracing;
pub use ledger::{FaultInjection, InMemoryLedger, InMemoryTransaction, ledger_clock};
pub use mocks::{FixedClock, test_clock};
pub use outbox::InMemoryOutbox;
pub use projection_mocks::InMemoryBalanceStore;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }
}
