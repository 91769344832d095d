//! Manager reservations: permanent withdrawal of empty tables.

use crate::state::{AllocationState, Occupancy};
use crate::types::{RequesterId, ReservationReport, TableClass, TableRef};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};

/// Source of the random choice among candidate tables
pub trait SlotPicker: Send + Sync {
    /// Pick an index in `0..upper`; `upper` is never zero
    fn pick(&self, upper: usize) -> usize;
}

/// Uniform picker backed by a seedable generator
#[derive(Debug)]
pub struct RandomPicker {
    rng: Mutex<StdRng>,
}

impl RandomPicker {
    /// Picker seeded from the operating system
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible picker
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl SlotPicker for RandomPicker {
    fn pick(&self, upper: usize) -> usize {
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_range(0..upper)
    }
}

impl AllocationState {
    /// Withdraw empty tables until at least `seats` seats are reserved
    ///
    /// Classes are visited largest first. Within a class, empty tables are
    /// drawn at random without replacement through `picker`. Occupied tables
    /// are never touched; when too few empty tables exist the report carries
    /// the shortfall.
    pub fn reserve(
        &mut self,
        requested_by: RequesterId,
        seats: u32,
        picker: &dyn SlotPicker,
    ) -> ReservationReport {
        let mut reserved = 0u32;
        let mut tables = Vec::new();

        for class in TableClass::DESCENDING {
            if reserved >= seats {
                break;
            }

            let mut candidates: Vec<usize> = self
                .pool(class)
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.occupancy().is_empty())
                .map(|(index, _)| index)
                .collect();

            while reserved < seats && !candidates.is_empty() {
                let index = candidates.swap_remove(picker.pick(candidates.len()));
                let table = TableRef::new(class, index);
                let Some(slot) = self.slot_mut(table) else {
                    continue;
                };
                slot.occupancy = Occupancy::Reserved;

                let capacity = u32::from(class.capacity());
                self.reserved_seats += capacity;
                self.free_seats = self.free_seats.saturating_sub(capacity);
                reserved += capacity;
                tables.push(table);
            }
        }

        ReservationReport {
            requested_by,
            requested_seats: seats,
            reserved_seats: reserved,
            reserved_tables: tables,
            shortfall: seats.saturating_sub(reserved),
        }
    }
}
