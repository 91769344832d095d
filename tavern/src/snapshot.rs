//! Read-only view of the allocation state for monitoring.
//!
//! A snapshot is taken under the engine store's read lock, so it is always
//! consistent with itself.

use crate::state::{AllocationState, Occupancy};
use crate::types::{PartyId, TableClass, TableRef};
use serde::Serialize;
use std::fmt;

/// One table as seen by the monitor
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TableView {
    /// Which table
    pub table: TableRef,
    /// Legacy occupancy: `-1` reserved, otherwise seats filled
    pub occupancy: i8,
    /// Owner of each seat
    pub seats: Vec<Option<PartyId>>,
}

impl TableView {
    /// Whether the table was withdrawn by a reservation
    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        self.occupancy < 0
    }
}

/// Consistent copy of everything a display needs
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AllocationSnapshot {
    /// Every table in the pool, smallest class first
    pub tables: Vec<TableView>,
    /// Whether the three-seat pool doubled
    pub doubled: bool,
    /// Seats free for allocation
    pub free_seats: u32,
    /// Seats withdrawn by reservations
    pub reserved_seats: u32,
    /// Seats in the pool
    pub total_capacity: u32,
    /// Parties waiting for a table
    pub waiting: usize,
    /// Parties currently seated
    pub seated_parties: usize,
    /// Seats' worth of dishes returned so far
    pub dirty_dishes: u32,
    /// Whether the building is being evacuated
    pub evacuating: bool,
}

impl AllocationState {
    /// Copy the state for display
    #[must_use]
    pub fn snapshot(&self) -> AllocationSnapshot {
        AllocationSnapshot {
            tables: self
                .tables()
                .map(|(table, slot)| TableView {
                    table,
                    occupancy: slot.occupancy().raw(),
                    seats: slot.seats().to_vec(),
                })
                .collect(),
            doubled: self.is_doubled(),
            free_seats: self.free_seats(),
            reserved_seats: self.reserved_seats(),
            total_capacity: self.total_capacity(),
            waiting: self.waiting_len(),
            seated_parties: self.seated_parties(),
            dirty_dishes: self.dirty_dishes(),
            evacuating: self.is_evacuating(),
        }
    }
}

impl AllocationSnapshot {
    /// Tables of one class
    pub fn class(&self, class: TableClass) -> impl Iterator<Item = &TableView> {
        self.tables.iter().filter(move |view| view.table.class == class)
    }

    /// Occupancy of `table`, if it is in the pool
    #[must_use]
    pub fn occupancy(&self, table: TableRef) -> Option<Occupancy> {
        self.tables
            .iter()
            .find(|view| view.table == table)
            .map(|view| match u8::try_from(view.occupancy) {
                Ok(seated) => Occupancy::Open(seated),
                Err(_) => Occupancy::Reserved,
            })
    }
}

impl fmt::Display for TableView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let capacity = self.table.class.capacity();
        f.write_str("[")?;
        if self.is_reserved() {
            for _ in 0..capacity {
                f.write_str("#")?;
            }
            return write!(f, " reserved]");
        }
        for seat in &self.seats {
            f.write_str(if seat.is_some() { "X" } else { "_" })?;
        }
        write!(f, " {}/{capacity}]", self.occupancy)
    }
}

impl fmt::Display for AllocationSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "free {}/{} reserved {} waiting {} seated {} dishes {}{}{}",
            self.free_seats,
            self.total_capacity,
            self.reserved_seats,
            self.waiting,
            self.seated_parties,
            self.dirty_dishes,
            if self.doubled { " doubled" } else { "" },
            if self.evacuating { " EVACUATING" } else { "" },
        )?;
        for class in TableClass::ASCENDING {
            write!(f, "  {class}:")?;
            for view in self.class(class) {
                write!(f, " {view}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
