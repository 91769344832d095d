//! # Tavern Testing
//!
//! Testing utilities and helpers for tavern reducers.
//!
//! This crate provides:
//! - A deterministic [`Clock`] implementation
//! - [`ReducerTest`], a Given-When-Then harness for reducers
//! - [`drain_effects`], which runs effect descriptions to completion and
//!   returns the actions they would feed back
//!
//! ## Example
//!
//! ```ignore
//! use tavern_testing::{drain_effects, ReducerTest};
//!
//! #[tokio::test]
//! async fn seat_request_is_answered() {
//!     let mut state = AllocationState::new(&layout);
//!     let effects = SeatingReducer.reduce(&mut state, request, &env);
//!     let events = drain_effects(effects).await;
//!     assert!(matches!(events[0], SeatingAction::Seated { .. }));
//! }
//! ```

use chrono::{DateTime, Utc};
use tavern_core::environment::Clock;


pub use reducer_test::{ReducerTest, assertions, drain_effects};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use tavern_testing::mocks::FixedClock;
    /// use tavern_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
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

    /// Create a default fixed clock for tests (2025-01-01 12:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T12:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

pub use mocks::{FixedClock, test_clock};
