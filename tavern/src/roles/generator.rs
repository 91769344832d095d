//! The front door: lets parties in at a steady pace.

use super::party::{Party, PartyOutcome};
use crate::alarm::FireAlarm;
use crate::channel::MessageQueue;
use crate::config::PartySettings;
use crate::types::{PartyId, PartySize};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info, info_span, warn};

/// Every party task spawned so far
///
/// Dropping the group aborts whatever is still running.
#[derive(Debug, Default)]
pub struct PartyGroup {
    tasks: JoinSet<PartyOutcome>,
}

impl PartyGroup {
    /// Empty group
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `party` as a member of the group
    pub fn spawn(&mut self, party: Party) {
        let span = info_span!("party", id = %party.id());
        self.tasks.spawn(party.run().instrument(span));
    }

    /// Parties still running
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no party is running
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every party, aborting the stragglers after `timeout`
    ///
    /// Outcomes come back in completion order.
    pub async fn join_all(mut self, timeout: Duration) -> Vec<PartyOutcome> {
        let mut outcomes = Vec::with_capacity(self.tasks.len());
        let joined = tokio::time::timeout(timeout, async {
            while let Some(result) = self.tasks.join_next().await {
                match result {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(error) => warn!(%error, "Party task failed"),
                }
            }
        })
        .await;

        if joined.is_err() {
            warn!(remaining = self.tasks.len(), "Parties still inside after timeout, aborting");
            self.tasks.abort_all();
        }
        outcomes
    }
}

/// Spawns parties until the quota is met or the fire alarm goes off
#[derive(Debug)]
pub struct Generator {
    settings: PartySettings,
    rng: StdRng,
    channel: MessageQueue,
    alarm: FireAlarm,
}

impl Generator {
    /// Creates a new `Generator`; `seed` makes sizes and ordering reproducible
    #[must_use]
    pub fn new(settings: PartySettings, seed: Option<u64>, channel: MessageQueue, alarm: FireAlarm) -> Self {
        let rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Self {
            settings,
            rng,
            channel,
            alarm,
        }
    }

    fn next_party(&mut self, id: u32) -> Party {
        let max = self.settings.max_size.clamp(1, PartySize::MAX);
        let size = PartySize::new(self.rng.gen_range(1..=max)).unwrap_or(PartySize::SINGLE);
        let orders = self.rng.gen_range(0..100) >= self.settings.no_order_percent;
        Party::new(
            PartyId::new(id),
            size,
            orders,
            self.channel.clone(),
            self.alarm.clone(),
            self.settings.eating_time,
        )
    }

    /// Let parties in, one per interval, the first one right away
    ///
    /// Returns the group so the caller can wait for everyone inside.
    pub async fn run(mut self) -> PartyGroup {
        info!(count = self.settings.count, interval = ?self.settings.interval, "Doors open");
        let mut fire = self.alarm.subscribe();
        let mut group = PartyGroup::new();

        for id in 1..=self.settings.count {
            if self.alarm.is_raised() {
                break;
            }
            if id > 1 {
                tokio::select! {
                    biased;
                    () = fire.raised() => break,
                    () = tokio::time::sleep(self.settings.interval) => {},
                }
            }

            let party = self.next_party(id);
            debug!(party = %party.id(), "Letting a party in");
            group.spawn(party);
        }

        if self.alarm.is_raised() {
            warn!("Fire! No more parties let in");
        }
        info!(spawned = group.len(), "Doors closed");
        group
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::channel::{MessageKind, Selector};

    fn settings(count: u32, no_order_percent: u8) -> PartySettings {
        PartySettings {
            count,
            interval: Duration::from_millis(1),
            max_size: 3,
            no_order_percent,
            eating_time: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn spawns_the_whole_quota() {
        let channel = MessageQueue::new();
        let alarm = FireAlarm::new();
        let group = Generator::new(settings(5, 0), Some(7), channel.clone(), alarm.clone()).run().await;

        let mut sizes = Vec::new();
        for _ in 0..5 {
            let request = tokio::time::timeout(
                Duration::from_secs(1),
                channel.recv(Selector::Kind(MessageKind::SeatRequest)),
            )
            .await
            .unwrap()
            .unwrap();
            let crate::channel::Message::SeatRequest { size, .. } = request else {
                unreachable!("selector only yields seat requests");
            };
            sizes.push(size.get());
        }
        assert!(sizes.iter().all(|s| (1..=3).contains(s)));

        alarm.raise();
        let outcomes = group.join_all(Duration::from_secs(1)).await;
        assert_eq!(outcomes, vec![PartyOutcome::Evacuated; 5]);
    }

    #[tokio::test]
    async fn nobody_orders_at_one_hundred_percent() {
        let channel = MessageQueue::new();
        let group = Generator::new(settings(3, 100), Some(1), channel.clone(), FireAlarm::new()).run().await;

        let outcomes = group.join_all(Duration::from_secs(1)).await;
        assert_eq!(outcomes, vec![PartyOutcome::LeftWithoutOrdering; 3]);
        assert!(channel.is_empty());
    }

    #[tokio::test]
    async fn fire_stops_the_door() {
        let alarm = FireAlarm::new();
        alarm.raise();
        let group = Generator::new(settings(10, 0), None, MessageQueue::new(), alarm).run().await;
        assert!(group.is_empty());
    }

    #[tokio::test]
    async fn stragglers_are_aborted() {
        let channel = MessageQueue::new();
        let group = Generator::new(settings(2, 0), Some(3), channel, FireAlarm::new()).run().await;
        let outcomes = group.join_all(Duration::from_millis(20)).await;
        assert!(outcomes.is_empty());
    }
}
