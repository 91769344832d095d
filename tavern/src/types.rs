//! Domain types for the tavern.
//!
//! Identifiers, party sizes, table classes and the reply payloads exchanged
//! between the seating engine and its clients.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of a party (one allocation unit)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartyId(u32);

impl PartyId {
    /// Creates a `PartyId` from its raw value
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw value
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Identifier of whoever asked for a reservation (the manager)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequesterId(u32);

impl RequesterId {
    /// Creates a `RequesterId` from its raw value
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

// ============================================================================
// Party size
// ============================================================================

/// Number of people in a party, always within `1..=4`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct PartySize(u8);

impl PartySize {
    /// Largest party any table can hold
    pub const MAX: u8 = 4;

    /// A party of one
    pub const SINGLE: Self = Self(1);

    /// Creates a party size, `None` when outside `1..=4`
    #[must_use]
    pub const fn new(size: u8) -> Option<Self> {
        if size >= 1 && size <= Self::MAX {
            Some(Self(size))
        } else {
            None
        }
    }

    /// Get the number of people
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Number of people as a seat count
    #[must_use]
    pub const fn seats(self) -> u32 {
        self.0 as u32
    }
}

impl TryFrom<u8> for PartySize {
    type Error = String;

    fn try_from(size: u8) -> Result<Self, Self::Error> {
        Self::new(size).ok_or_else(|| format!("party size {size} is outside 1..={}", Self::MAX))
    }
}

impl From<PartySize> for u8 {
    fn from(size: PartySize) -> Self {
        size.0
    }
}

impl fmt::Display for PartySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tables
// ============================================================================

/// Capacity class of a table: the number of seats it has
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TableClass {
    /// Single seat, never shared
    One,
    /// Two seats
    Two,
    /// Three seats, the only class whose pool can double
    Three,
    /// Four seats
    Four,
}

impl TableClass {
    /// Every class, smallest first
    pub const ASCENDING: [Self; 4] = [Self::One, Self::Two, Self::Three, Self::Four];

    /// Every class, largest first
    pub const DESCENDING: [Self; 4] = [Self::Four, Self::Three, Self::Two, Self::One];

    /// Seats at one table of this class
    #[must_use]
    pub const fn capacity(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
            Self::Four => 4,
        }
    }

    /// Position of this class in per-class arrays
    #[must_use]
    pub const fn slot(self) -> usize {
        self.capacity() as usize - 1
    }

    /// Whether a single party of `size` fits at one table of this class
    #[must_use]
    pub const fn fits(self, size: PartySize) -> bool {
        size.get() <= self.capacity()
    }
}

impl fmt::Display for TableClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X{}", self.capacity())
    }
}

/// One physical table: its class and position within that class's pool
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableRef {
    /// Capacity class
    pub class: TableClass,
    /// Index within the class pool
    pub index: usize,
}

impl TableRef {
    /// Creates a table reference
    #[must_use]
    pub const fn new(class: TableClass, index: usize) -> Self {
        Self { class, index }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.class, self.index)
    }
}

// ============================================================================
// Replies
// ============================================================================

/// Answer to a seat request
///
/// `table` is `None` when the party was turned away and must not expect
/// service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatReply {
    /// Party the reply is addressed to
    pub party: PartyId,
    /// Size the party asked for
    pub size: PartySize,
    /// Assigned table, `None` for "no table"
    pub table: Option<TableRef>,
}

impl SeatReply {
    /// Reply granting `table`
    #[must_use]
    pub const fn seated(party: PartyId, size: PartySize, table: TableRef) -> Self {
        Self {
            party,
            size,
            table: Some(table),
        }
    }

    /// Reply refusing service
    #[must_use]
    pub const fn rejected(party: PartyId, size: PartySize) -> Self {
        Self {
            party,
            size,
            table: None,
        }
    }

    /// Whether the party got a table
    #[must_use]
    pub const fn is_seated(&self) -> bool {
        self.table.is_some()
    }

    /// `(class, index)` in the numeric wire encoding: `(0, -1)` means rejected
    #[must_use]
    #[allow(clippy::cast_possible_wrap)] // table indices are tiny
    pub const fn legacy_code(&self) -> (u8, i64) {
        match self.table {
            Some(table) => (table.class.capacity(), table.index as i64),
            None => (0, -1),
        }
    }
}

/// Outcome of a reservation command
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationReport {
    /// Who asked
    pub requested_by: RequesterId,
    /// Seats asked for
    pub requested_seats: u32,
    /// Seats actually withdrawn
    pub reserved_seats: u32,
    /// Tables withdrawn, in the order they were picked
    pub reserved_tables: Vec<TableRef>,
    /// Seats that could not be found, zero when the request was met
    pub shortfall: u32,
}

impl ReservationReport {
    /// Whether every requested seat was reserved
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.shortfall == 0
    }
}
