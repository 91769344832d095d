//! The seating engine.
//!
//! [`SeatingReducer`] owns every decision about tables: seating, queueing,
//! release, doubling, reservation and evacuation. It runs inside a
//! [`SeatingStore`], whose lock serializes access to the allocation state.
//! [`SeatingService`] feeds it from the request and control channels.

pub mod actions;
pub mod allocation;
pub mod reducer;
pub mod reservation;
pub mod service;

pub use actions::{EngineAction, RejectReason};
pub use allocation::{Admission, AllocationError, Enqueued};
pub use reducer::{SeatingEnvironment, SeatingReducer};
pub use reservation::{RandomPicker, SlotPicker};
pub use service::{
    ControlEvent, ENGINE_KINDS, ReceiveDiscipline, SeatingService, SeatingStore, ServiceExit,
};
