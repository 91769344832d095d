//! The people around the engine.
//!
//! Each role runs as its own task and talks to the engine only through the
//! request channel, the control channel and the fire alarm.

pub mod cashier;
pub mod coordinator;
pub mod generator;
pub mod monitor;
pub mod party;

pub use cashier::Cashier;
pub use coordinator::{
    CoordinatorAction, CoordinatorEnvironment, CoordinatorReducer, CoordinatorSchedule,
    CoordinatorState, CoordinatorStore,
};
pub use generator::{Generator, PartyGroup};
pub use monitor::Monitor;
pub use party::{Party, PartyOutcome};
