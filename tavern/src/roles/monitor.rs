//! Periodic view of the dining room, logged at debug level.

use crate::alarm::FireAlarm;
use crate::engine::SeatingStore;
use crate::snapshot::AllocationSnapshot;
use crate::state::AllocationState;
use std::time::Duration;
use tracing::debug;

/// Logs a snapshot of the allocation state on a fixed interval
pub struct Monitor {
    store: SeatingStore,
    alarm: FireAlarm,
    interval: Duration,
}

impl Monitor {
    /// Creates a new `Monitor`
    #[must_use]
    pub const fn new(store: SeatingStore, alarm: FireAlarm, interval: Duration) -> Self {
        Self {
            store,
            alarm,
            interval,
        }
    }

    /// Log until the fire alarm goes off, then log once more
    ///
    /// Returns the last snapshot taken.
    pub async fn run(self) -> AllocationSnapshot {
        let mut fire = self.alarm.subscribe();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            let raised = tokio::select! {
                biased;
                () = fire.raised() => true,
                _ = ticker.tick() => false,
            };

            let snapshot = self.store.state(AllocationState::snapshot).await;
            debug!("\n{snapshot}");
            if raised {
                return snapshot;
            }
        }
    }
}
