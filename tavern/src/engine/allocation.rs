//! Seating algorithms: slot search, allocation, release, queue admission and
//! the one-shot doubling of the three-seat pool.

use crate::state::{AllocationState, Occupancy, Placement, Waiter};
use crate::types::{PartyId, PartySize, TableClass, TableRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why an allocation could not be recorded
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationError {
    /// The table is not in the pool
    #[error("table {0} is not in the pool")]
    UnknownTable(TableRef),

    /// The table cannot take this party
    #[error("table {table} cannot seat a party of {size}")]
    NotEligible {
        /// Table asked for
        table: TableRef,
        /// Party size
        size: PartySize,
    },

    /// The party already sits somewhere
    #[error("party {0} is already seated")]
    AlreadySeated(PartyId),

    /// The party index is full
    #[error("party index full ({0} entries)")]
    IndexFull(usize),
}

/// A waiter seated by [`AllocationState::admit_waiters`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Admission {
    /// Party that got the table
    pub party: PartyId,
    /// Its size
    pub size: PartySize,
    /// Table assigned
    pub table: TableRef,
}

/// Result of trying to add a party to the waiting queue
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enqueued {
    /// Queued at this zero-based position
    At(usize),
    /// Queue is full
    Full,
}

/// Whether a party of `size` may sit at a table of `class` currently in `occupancy`
///
/// Empty tables take anyone who fits. An occupied table only takes a second
/// party of the same size as the one already there, never at a single-seat
/// table, and only if both fit.
const fn eligible(class: TableClass, occupancy: Occupancy, size: PartySize) -> bool {
    match occupancy {
        Occupancy::Reserved => false,
        Occupancy::Open(0) => class.fits(size),
        Occupancy::Open(n) => {
            !matches!(class, TableClass::One)
                && n == size.get()
                && n + size.get() <= class.capacity()
        },
    }
}

impl AllocationState {
    /// First table able to take a party of `size`
    ///
    /// Classes are searched smallest first starting at the smallest that can
    /// hold the party (single-seat tables only for parties of one), tables in
    /// index order. Three-seat tables are searched up to the current
    /// effective count.
    #[must_use]
    pub fn find_slot(&self, size: PartySize) -> Option<TableRef> {
        TableClass::ASCENDING
            .into_iter()
            .filter(|class| match class {
                TableClass::One => size.get() == 1,
                _ => class.fits(size),
            })
            .find_map(|class| {
                self.pool(class)
                    .iter()
                    .position(|slot| eligible(class, slot.occupancy, size))
                    .map(|index| TableRef::new(class, index))
            })
    }

    /// Seat `party` at `table`
    ///
    /// # Errors
    ///
    /// Fails without touching the state when the table is not in the pool or
    /// cannot take the party, when the party already sits somewhere, or when
    /// the party index is full.
    pub fn allocate(
        &mut self,
        table: TableRef,
        size: PartySize,
        party: PartyId,
    ) -> Result<(), AllocationError> {
        if self.placements.contains_key(&party) {
            return Err(AllocationError::AlreadySeated(party));
        }
        if self.placements.len() >= self.limits.party_index_capacity {
            return Err(AllocationError::IndexFull(self.limits.party_index_capacity));
        }

        let slot = self
            .slot_mut(table)
            .ok_or(AllocationError::UnknownTable(table))?;
        if !eligible(table.class, slot.occupancy, size) {
            return Err(AllocationError::NotEligible { table, size });
        }

        slot.occupancy = match table.class {
            TableClass::One => Occupancy::Open(1),
            _ => Occupancy::Open(slot.occupancy.seated() + size.get()),
        };
        slot.seats
            .iter_mut()
            .filter(|seat| seat.is_none())
            .take(usize::from(size.get()))
            .for_each(|seat| *seat = Some(party));

        self.free_seats = self.free_seats.saturating_sub(size.seats());
        self.placements.insert(party, Placement { table, size });
        Ok(())
    }

    /// Free the seats held by `party`
    ///
    /// Returns where the party sat, or `None` when it is not seated. Seats at
    /// a reserved table are not credited back. Admission of waiters is left
    /// to the caller.
    pub fn release(&mut self, party: PartyId) -> Option<Placement> {
        let placement = self.placements.remove(&party)?;
        let seats = placement.size.seats();

        let mut credit = false;
        if let Some(slot) = self.slot_mut(placement.table) {
            if let Occupancy::Open(n) = slot.occupancy {
                slot.occupancy = Occupancy::Open(n.saturating_sub(placement.size.get()));
                credit = true;
            }
            for seat in &mut slot.seats {
                if *seat == Some(party) {
                    *seat = None;
                }
            }
        }

        if credit {
            self.free_seats += seats;
        }
        self.dirty_dishes += seats;
        Some(placement)
    }

    /// Append a party to the waiting queue
    pub fn enqueue(&mut self, party: PartyId, size: PartySize) -> Enqueued {
        if self.waiting.len() >= self.limits.waiting_capacity {
            return Enqueued::Full;
        }
        self.waiting.push_back(Waiter { party, size });
        Enqueued::At(self.waiting.len() - 1)
    }

    /// Seat waiters from the head of the queue until the head no longer fits
    ///
    /// A smaller waiter behind a blocked head is never seated first.
    pub fn admit_waiters(&mut self) -> Vec<Admission> {
        let mut admitted = Vec::new();
        if self.evacuating {
            return admitted;
        }

        while let Some(&Waiter { party, size }) = self.waiting.front() {
            let Some(table) = self.find_slot(size) else {
                break;
            };
            if self.allocate(table, size, party).is_err() {
                break;
            }
            self.waiting.pop_front();
            admitted.push(Admission { party, size, table });
        }

        admitted
    }

    /// Double the three-seat pool
    ///
    /// Returns the seats added, or `None` when the pool has already doubled.
    pub fn double_class_three(&mut self) -> Option<u32> {
        if self.doubled {
            return None;
        }
        let added = u32::try_from(self.layout.threes)
            .unwrap_or(u32::MAX)
            .saturating_mul(u32::from(TableClass::Three.capacity()));
        self.doubled = true;
        self.free_seats += added;
        Some(added)
    }

    /// Enter evacuation and empty the waiting queue
    ///
    /// Returns the waiters that were dropped so each can be told "no table".
    /// Calling it again returns nothing new.
    pub fn begin_evacuation(&mut self) -> Vec<Waiter> {
        self.evacuating = true;
        self.waiting.drain(..).collect()
    }
}
