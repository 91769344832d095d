//! Actions of the seating engine: commands coming in, events going out.

use super::allocation::AllocationError;
use crate::types::{PartyId, PartySize, RequesterId, ReservationReport, TableRef};
use serde::{Deserialize, Serialize};

/// Why a party was turned away
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// No table free and the waiting queue is full
    QueueFull,
    /// The building is being evacuated
    Evacuating,
    /// A free table was found but the allocation could not be recorded
    Allocation(AllocationError),
}

impl RejectReason {
    /// Short label for logs and metrics
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::QueueFull => "queue_full",
            Self::Evacuating => "evacuating",
            Self::Allocation(_) => "allocation",
        }
    }
}

/// Commands and events of the seating engine
///
/// Commands mutate the allocation state. Events are what the engine reports
/// back through its effects; they reach observers on the action broadcast
/// and are no-ops when fed back into the reducer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineAction {
    // Commands
    /// A party asks for a table
    RequestSeat {
        /// Requesting party
        party: PartyId,
        /// Seats needed
        size: PartySize,
    },

    /// A party returned its dishes and leaves
    ReturnDishes {
        /// Leaving party
        party: PartyId,
        /// Seats the party claims to hold
        size: PartySize,
    },

    /// The manager withdraws seats from service
    ReserveSeats {
        /// Who asks
        requested_by: RequesterId,
        /// Seats to withdraw
        count: u32,
    },

    /// Double the three-seat pool
    DoubleClassThree,

    /// Fire: reject everything from now on
    Evacuate,

    // Events
    /// A party got a table, directly or from the queue
    Seated {
        /// Seated party
        party: PartyId,
        /// Its size
        size: PartySize,
        /// Table assigned
        table: TableRef,
        /// Whether it came from the waiting queue
        from_queue: bool,
    },

    /// A party joined the waiting queue
    Queued {
        /// Waiting party
        party: PartyId,
        /// Its size
        size: PartySize,
        /// Zero-based queue position
        position: usize,
    },

    /// A party was turned away
    Rejected {
        /// Rejected party
        party: PartyId,
        /// Its size
        size: PartySize,
        /// Why
        reason: RejectReason,
    },

    /// A party left and its seats were freed
    Released {
        /// Leaving party
        party: PartyId,
        /// Seats freed
        size: PartySize,
        /// Table it sat at
        table: TableRef,
    },

    /// A dish return for a party that is not seated
    ReleaseIgnored {
        /// Unknown party
        party: PartyId,
    },

    /// A reservation was carried out
    ReservationCompleted(ReservationReport),

    /// The three-seat pool doubled
    ClassThreeDoubled {
        /// Seats added
        added_seats: u32,
    },

    /// A doubling request arrived after the pool had already doubled
    DoublingIgnored,

    /// Evacuation started
    Evacuated {
        /// Waiters turned away when the queue was emptied
        drained: usize,
    },
}

impl EngineAction {
    /// Whether this action is a command
    #[must_use]
    pub const fn is_command(&self) -> bool {
        matches!(
            self,
            Self::RequestSeat { .. }
                | Self::ReturnDishes { .. }
                | Self::ReserveSeats { .. }
                | Self::DoubleClassThree
                | Self::Evacuate
        )
    }

    /// Whether this action is an event
    #[must_use]
    pub const fn is_event(&self) -> bool {
        !self.is_command()
    }
}
