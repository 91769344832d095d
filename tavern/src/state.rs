//! Allocation state: the single source of truth for tables, seats and the
//! waiting queue.
//!
//! The state is plain data. It is owned by the seating engine's `Store`,
//! which serializes every mutation through its write lock; the algorithms
//! that mutate it live in [`crate::engine`].

use crate::types::{PartyId, PartySize, TableClass, TableRef};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

/// Number of tables per class at startup
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLayout {
    /// Single-seat tables
    pub ones: usize,
    /// Two-seat tables
    pub twos: usize,
    /// Three-seat tables (before doubling)
    pub threes: usize,
    /// Four-seat tables
    pub fours: usize,
}

impl TableLayout {
    /// Layout with the given number of tables per class
    #[must_use]
    pub const fn new(ones: usize, twos: usize, threes: usize, fours: usize) -> Self {
        Self {
            ones,
            twos,
            threes,
            fours,
        }
    }

    /// Base number of tables of `class`
    #[must_use]
    pub const fn count(&self, class: TableClass) -> usize {
        match class {
            TableClass::One => self.ones,
            TableClass::Two => self.twos,
            TableClass::Three => self.threes,
            TableClass::Four => self.fours,
        }
    }

    /// Total number of tables, counting the doubled three-seat pool when asked
    #[must_use]
    pub const fn tables(&self, doubled: bool) -> usize {
        let threes = if doubled { self.threes * 2 } else { self.threes };
        self.ones + self.twos + threes + self.fours
    }

    /// Most parties that can be seated at once
    ///
    /// Single-seat tables hold one party, every other table at most two.
    #[must_use]
    pub const fn max_parties(&self, doubled: bool) -> usize {
        self.ones + 2 * (self.tables(doubled) - self.ones)
    }
}

impl Default for TableLayout {
    fn default() -> Self {
        Self::new(4, 3, 2, 2)
    }
}

/// Occupancy of one table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Occupancy {
    /// In service with this many seats taken (0 = empty)
    Open(u8),
    /// Withdrawn from service for the rest of the run
    Reserved,
}

impl Occupancy {
    /// Numeric encoding: `-1` reserved, otherwise seats taken
    #[must_use]
    pub fn raw(self) -> i8 {
        match self {
            Self::Open(n) => i8::try_from(n).unwrap_or(i8::MAX),
            Self::Reserved => -1,
        }
    }

    /// Whether nobody sits here and the table is still in service
    #[must_use]
    pub const fn is_empty(self) -> bool {
        matches!(self, Self::Open(0))
    }

    /// Seats taken, zero for reserved tables
    #[must_use]
    pub const fn seated(self) -> u8 {
        match self {
            Self::Open(n) => n,
            Self::Reserved => 0,
        }
    }
}

/// One physical table
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub(crate) occupancy: Occupancy,
    /// Owner of each seat, used only for display
    pub(crate) seats: Vec<Option<PartyId>>,
}

impl Slot {
    fn empty(class: TableClass) -> Self {
        Self {
            occupancy: Occupancy::Open(0),
            seats: vec![None; usize::from(class.capacity())],
        }
    }

    /// Current occupancy
    #[must_use]
    pub const fn occupancy(&self) -> Occupancy {
        self.occupancy
    }

    /// Owner of each seat
    #[must_use]
    pub fn seats(&self) -> &[Option<PartyId>] {
        &self.seats
    }
}

/// Where a seated party sits and how many seats it took
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Table the party sits at
    pub table: TableRef,
    /// Seats the party occupies
    pub size: PartySize,
}

/// A party waiting for a table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Waiter {
    /// Who is waiting
    pub party: PartyId,
    /// How many seats they need
    pub size: PartySize,
}

/// Capacity limits of the queue and the party index
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateLimits {
    /// Maximum number of waiting parties
    pub waiting_capacity: usize,
    /// Maximum number of seated parties tracked at once
    pub party_index_capacity: usize,
}

impl Default for StateLimits {
    fn default() -> Self {
        Self {
            waiting_capacity: 50,
            party_index_capacity: 100,
        }
    }
}

/// A broken invariant found by [`AllocationState::check_invariants`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Seat accounting does not add up
    #[error("capacity mismatch: free {free} + reserved {reserved} + seated {seated} != total {total}")]
    Capacity {
        /// Free seats
        free: u32,
        /// Reserved seats
        reserved: u32,
        /// Seats taken at non-reserved tables
        seated: u32,
        /// Total capacity
        total: u32,
    },

    /// A table holds more people than it has seats
    #[error("table {table} oversold: {occupancy} seated")]
    Oversold {
        /// Offending table
        table: TableRef,
        /// Seats taken
        occupancy: u8,
    },

    /// Parties of different sizes share a table
    #[error("table {table} mixes party sizes")]
    MixedSizes {
        /// Offending table
        table: TableRef,
    },

    /// Occupancy and the party index disagree
    #[error("table {table} records {occupancy} seated but its parties hold {indexed}")]
    IndexMismatch {
        /// Offending table
        table: TableRef,
        /// Occupancy recorded on the table
        occupancy: u8,
        /// Seats held by indexed parties
        indexed: u32,
    },

    /// A table beyond the effective class three count is in use
    #[error("table {table} is beyond the effective pool")]
    OutsidePool {
        /// Offending table
        table: TableRef,
    },
}

/// The authoritative allocation state
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AllocationState {
    pub(crate) layout: TableLayout,
    pub(crate) limits: StateLimits,
    /// One pool per class, class three allocated at twice its base count
    pub(crate) pools: [Vec<Slot>; 4],
    pub(crate) doubled: bool,
    pub(crate) free_seats: u32,
    pub(crate) reserved_seats: u32,
    pub(crate) waiting: VecDeque<Waiter>,
    pub(crate) evacuating: bool,
    pub(crate) placements: HashMap<PartyId, Placement>,
    pub(crate) dirty_dishes: u32,
}

impl AllocationState {
    /// Fresh state: every table empty, nothing reserved, nobody waiting
    #[must_use]
    pub fn new(layout: TableLayout, limits: StateLimits) -> Self {
        let pools = TableClass::ASCENDING.map(|class| {
            let count = match class {
                TableClass::Three => layout.threes * 2,
                _ => layout.count(class),
            };
            vec![Slot::empty(class); count]
        });

        let mut state = Self {
            layout,
            limits,
            pools,
            doubled: false,
            free_seats: 0,
            reserved_seats: 0,
            waiting: VecDeque::with_capacity(limits.waiting_capacity),
            evacuating: false,
            placements: HashMap::with_capacity(limits.party_index_capacity),
            dirty_dishes: 0,
        };
        state.free_seats = state.total_capacity();
        state
    }

    /// Tables of `class` currently in the pool
    #[must_use]
    pub const fn effective_count(&self, class: TableClass) -> usize {
        match class {
            TableClass::Three if self.doubled => self.layout.threes * 2,
            _ => self.layout.count(class),
        }
    }

    /// Seats across every table in the pool, reserved ones included
    #[must_use]
    pub fn total_capacity(&self) -> u32 {
        TableClass::ASCENDING
            .iter()
            .map(|&class| {
                u32::try_from(self.effective_count(class)).unwrap_or(u32::MAX)
                    * u32::from(class.capacity())
            })
            .sum()
    }

    /// Tables of `class` in the pool
    pub(crate) fn pool(&self, class: TableClass) -> &[Slot] {
        let count = self.effective_count(class);
        &self.pools[class.slot()][..count]
    }

    /// The table at `table`, if it is in the pool
    #[must_use]
    pub fn slot(&self, table: TableRef) -> Option<&Slot> {
        self.pool(table.class).get(table.index)
    }

    pub(crate) fn slot_mut(&mut self, table: TableRef) -> Option<&mut Slot> {
        let count = self.effective_count(table.class);
        self.pools[table.class.slot()][..count].get_mut(table.index)
    }

    /// Startup layout
    #[must_use]
    pub const fn layout(&self) -> TableLayout {
        self.layout
    }

    /// Queue and index limits
    #[must_use]
    pub const fn limits(&self) -> StateLimits {
        self.limits
    }

    /// Whether the three-seat pool has doubled
    #[must_use]
    pub const fn is_doubled(&self) -> bool {
        self.doubled
    }

    /// Seats available to new parties
    #[must_use]
    pub const fn free_seats(&self) -> u32 {
        self.free_seats
    }

    /// Seats withdrawn by reservations
    #[must_use]
    pub const fn reserved_seats(&self) -> u32 {
        self.reserved_seats
    }

    /// Parties waiting, head first
    pub fn waiting(&self) -> impl Iterator<Item = &Waiter> {
        self.waiting.iter()
    }

    /// Number of waiting parties
    #[must_use]
    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    /// Whether the engine has started evacuating
    #[must_use]
    pub const fn is_evacuating(&self) -> bool {
        self.evacuating
    }

    /// Where `party` sits, if seated
    #[must_use]
    pub fn placement(&self, party: PartyId) -> Option<Placement> {
        self.placements.get(&party).copied()
    }

    /// Number of seated parties
    #[must_use]
    pub fn seated_parties(&self) -> usize {
        self.placements.len()
    }

    /// Seats worth of dishes returned so far
    #[must_use]
    pub const fn dirty_dishes(&self) -> u32 {
        self.dirty_dishes
    }

    /// Every table in the pool with its reference, smallest class first
    pub fn tables(&self) -> impl Iterator<Item = (TableRef, &Slot)> {
        TableClass::ASCENDING.into_iter().flat_map(move |class| {
            self.pool(class)
                .iter()
                .enumerate()
                .map(move |(index, slot)| (TableRef::new(class, index), slot))
        })
    }

    /// Verify the accounting and sharing invariants
    ///
    /// # Errors
    ///
    /// Returns the first [`InvariantViolation`] found.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let mut seated = 0u32;
        let mut held: HashMap<TableRef, Vec<PartySize>> = HashMap::new();
        for placement in self.placements.values() {
            held.entry(placement.table).or_default().push(placement.size);
        }

        for (table, slot) in self.tables() {
            let occupancy = slot.occupancy.seated();
            if occupancy > table.class.capacity() {
                return Err(InvariantViolation::Oversold { table, occupancy });
            }

            let sizes = held.remove(&table).unwrap_or_default();
            if sizes.windows(2).any(|pair| pair[0] != pair[1]) {
                return Err(InvariantViolation::MixedSizes { table });
            }

            let indexed: u32 = sizes.iter().map(|s| s.seats()).sum();
            if slot.occupancy != Occupancy::Reserved && indexed != u32::from(occupancy) {
                return Err(InvariantViolation::IndexMismatch {
                    table,
                    occupancy,
                    indexed,
                });
            }

            seated += u32::from(occupancy);
        }

        if let Some(table) = held.into_keys().next() {
            return Err(InvariantViolation::OutsidePool { table });
        }

        let total = self.total_capacity();
        if self.free_seats + self.reserved_seats + seated != total {
            return Err(InvariantViolation::Capacity {
                free: self.free_seats,
                reserved: self.reserved_seats,
                seated,
                total,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_is_all_free() {
        let state = AllocationState::new(TableLayout::default(), StateLimits::default());
        // 4×1 + 3×2 + 2×3 + 2×4
        assert_eq!(state.total_capacity(), 24);
        assert_eq!(state.free_seats(), 24);
        assert_eq!(state.reserved_seats(), 0);
        assert!(!state.is_doubled());
        assert_eq!(state.effective_count(TableClass::Three), 2);
        assert_eq!(state.tables().count(), 11);
        assert_eq!(state.check_invariants(), Ok(()));
    }

    #[test]
    fn hidden_class_three_tables_are_out_of_pool() {
        let state = AllocationState::new(TableLayout::default(), StateLimits::default());
        assert!(state.slot(TableRef::new(TableClass::Three, 1)).is_some());
        assert!(state.slot(TableRef::new(TableClass::Three, 2)).is_none());
    }

    #[test]
    fn layout_party_bounds() {
        let layout = TableLayout::default();
        assert_eq!(layout.tables(false), 11);
        assert_eq!(layout.tables(true), 13);
        assert_eq!(layout.max_parties(true), 4 + 2 * 9);
    }

    #[test]
    fn occupancy_raw_encoding() {
        assert_eq!(Occupancy::Reserved.raw(), -1);
        assert_eq!(Occupancy::Open(0).raw(), 0);
        assert_eq!(Occupancy::Open(3).raw(), 3);
        assert!(Occupancy::Open(0).is_empty());
        assert!(!Occupancy::Reserved.is_empty());
    }
}
