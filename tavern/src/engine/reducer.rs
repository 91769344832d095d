//! The seating reducer.
//!
//! Runs inside the engine's `Store`, so each call holds the state's write
//! lock for its whole duration. Replies leave through the environment's
//! [`Outbox`] from `Effect::Future`s, each of which then yields the matching
//! event so observers see it on the action broadcast.

use super::actions::{EngineAction, RejectReason};
use super::allocation::Enqueued;
use super::reservation::SlotPicker;
use crate::alarm::FireAlarm;
use crate::channel::{Message, Outbox};
use crate::state::AllocationState;
use crate::types::{PartyId, PartySize, SeatReply};
use std::sync::Arc;
use tavern_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};
use tracing::{debug, error, info, warn};

/// Dependencies of the seating reducer
#[derive(Clone)]
pub struct SeatingEnvironment {
    /// Where replies are delivered
    pub outbox: Arc<dyn Outbox>,
    /// Evacuation flag, checked before any party is seated
    pub alarm: FireAlarm,
    /// Random choice for reservations
    pub picker: Arc<dyn SlotPicker>,
}

impl SeatingEnvironment {
    /// Creates a new `SeatingEnvironment`
    #[must_use]
    pub fn new(outbox: Arc<dyn Outbox>, alarm: FireAlarm, picker: Arc<dyn SlotPicker>) -> Self {
        Self {
            outbox,
            alarm,
            picker,
        }
    }
}

/// Reducer owning every seating decision
#[derive(Clone, Copy, Debug, Default)]
pub struct SeatingReducer;

type Effects = SmallVec<[Effect<EngineAction>; 4]>;

impl SeatingReducer {
    /// Creates a new `SeatingReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Deliver `message`, then report `event`
    fn reply(env: &SeatingEnvironment, message: Message, event: EngineAction) -> Effect<EngineAction> {
        let outbox = Arc::clone(&env.outbox);
        Effect::future(async move {
            if let Err(error) = outbox.deliver(message) {
                warn!(%error, "Reply dropped");
            }
            Some(event)
        })
    }

    /// Report `event` without delivering anything
    fn announce(event: EngineAction) -> Effect<EngineAction> {
        Effect::future(async move { Some(event) })
    }

    fn reject(
        env: &SeatingEnvironment,
        party: PartyId,
        size: PartySize,
        reason: RejectReason,
    ) -> Effect<EngineAction> {
        metrics::counter!("tavern.rejected", "reason" => reason.as_str()).increment(1);
        info!(%party, %size, reason = reason.as_str(), "Party rejected");
        Self::reply(
            env,
            Message::SeatReply(SeatReply::rejected(party, size)),
            EngineAction::Rejected {
                party,
                size,
                reason,
            },
        )
    }

    /// Seat whoever the queue head lets through, replies in queue order
    fn admit(state: &mut AllocationState, env: &SeatingEnvironment) -> Vec<Effect<EngineAction>> {
        state
            .admit_waiters()
            .into_iter()
            .map(|admission| {
                metrics::counter!("tavern.seated").increment(1);
                info!(
                    party = %admission.party,
                    size = %admission.size,
                    table = %admission.table,
                    "Waiting party seated"
                );
                Self::reply(
                    env,
                    Message::SeatReply(SeatReply::seated(
                        admission.party,
                        admission.size,
                        admission.table,
                    )),
                    EngineAction::Seated {
                        party: admission.party,
                        size: admission.size,
                        table: admission.table,
                        from_queue: true,
                    },
                )
            })
            .collect()
    }

    /// Follow-up to freed or added seats: admit waiters, or turn them away
    /// when the alarm has already gone off
    fn after_capacity_change(state: &mut AllocationState, env: &SeatingEnvironment) -> Vec<Effect<EngineAction>> {
        if state.is_evacuating() || env.alarm.is_raised() {
            return Self::evacuate(state, env).into_vec();
        }
        Self::admit(state, env)
    }

    /// Enter evacuation once, telling every waiter there is no table
    fn evacuate(state: &mut AllocationState, env: &SeatingEnvironment) -> Effects {
        if state.is_evacuating() {
            return SmallVec::new();
        }

        let drained = state.begin_evacuation();
        warn!(drained = drained.len(), "Evacuating: waiting queue emptied");

        let mut effects: Vec<_> = drained
            .iter()
            .map(|waiter| Self::reject(env, waiter.party, waiter.size, RejectReason::Evacuating))
            .collect();
        effects.push(Self::announce(EngineAction::Evacuated {
            drained: drained.len(),
        }));
        smallvec![Effect::chain(effects)]
    }

    fn request_seat(
        state: &mut AllocationState,
        env: &SeatingEnvironment,
        party: PartyId,
        size: PartySize,
    ) -> Effects {
        if state.is_evacuating() || env.alarm.is_raised() {
            let mut effects = Self::evacuate(state, env);
            effects.push(Self::reject(env, party, size, RejectReason::Evacuating));
            return effects;
        }

        if let Some(table) = state.find_slot(size) {
            return match state.allocate(table, size, party) {
                Ok(()) => {
                    metrics::counter!("tavern.seated").increment(1);
                    info!(%party, %size, %table, free = state.free_seats(), "Party seated");
                    smallvec![Self::reply(
                        env,
                        Message::SeatReply(SeatReply::seated(party, size, table)),
                        EngineAction::Seated {
                            party,
                            size,
                            table,
                            from_queue: false,
                        },
                    )]
                },
                Err(allocation) => {
                    error!(%party, %allocation, "Allocation failed");
                    smallvec![Self::reject(env, party, size, RejectReason::Allocation(allocation))]
                },
            };
        }

        match state.enqueue(party, size) {
            Enqueued::At(position) => {
                metrics::counter!("tavern.queued").increment(1);
                debug!(%party, %size, position, "No table free, party queued");
                smallvec![Self::announce(EngineAction::Queued {
                    party,
                    size,
                    position,
                })]
            },
            Enqueued::Full => smallvec![Self::reject(env, party, size, RejectReason::QueueFull)],
        }
    }

    fn return_dishes(
        state: &mut AllocationState,
        env: &SeatingEnvironment,
        party: PartyId,
        claimed: PartySize,
    ) -> Effects {
        let Some(placement) = state.release(party) else {
            warn!(%party, "Dishes returned by a party that is not seated, ignoring");
            return smallvec![Self::announce(EngineAction::ReleaseIgnored { party })];
        };

        if placement.size != claimed {
            warn!(%party, claimed = %claimed, recorded = %placement.size, "Dish return size differs from allocation");
        }
        metrics::counter!("tavern.released").increment(1);
        info!(
            %party,
            table = %placement.table,
            free = state.free_seats(),
            dishes = state.dirty_dishes(),
            "Party left"
        );

        let mut effects = vec![Self::announce(EngineAction::Released {
            party,
            size: placement.size,
            table: placement.table,
        })];
        effects.extend(Self::after_capacity_change(state, env));
        smallvec![Effect::chain(effects)]
    }
}

impl Reducer for SeatingReducer {
    type State = AllocationState;
    type Action = EngineAction;
    type Environment = SeatingEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects {
        match action {
            // ========== Commands ==========
            EngineAction::RequestSeat { party, size } => Self::request_seat(state, env, party, size),

            EngineAction::ReturnDishes { party, size } => Self::return_dishes(state, env, party, size),

            EngineAction::ReserveSeats {
                requested_by,
                count,
            } => {
                let report = state.reserve(requested_by, count, env.picker.as_ref());
                if report.is_complete() {
                    info!(
                        %requested_by,
                        seats = report.reserved_seats,
                        tables = report.reserved_tables.len(),
                        "Seats reserved"
                    );
                } else {
                    warn!(
                        %requested_by,
                        seats = report.reserved_seats,
                        shortfall = report.shortfall,
                        "Reservation only partly met"
                    );
                }
                smallvec![Self::reply(
                    env,
                    Message::ReservationReport(report.clone()),
                    EngineAction::ReservationCompleted(report),
                )]
            },

            EngineAction::DoubleClassThree => match state.double_class_three() {
                Some(added_seats) => {
                    info!(added_seats, free = state.free_seats(), "Three-seat tables doubled");
                    let mut effects = vec![Self::announce(EngineAction::ClassThreeDoubled {
                        added_seats,
                    })];
                    effects.extend(Self::after_capacity_change(state, env));
                    smallvec![Effect::chain(effects)]
                },
                None => {
                    info!("Three-seat tables already doubled, ignoring");
                    smallvec![Self::announce(EngineAction::DoublingIgnored)]
                },
            },

            EngineAction::Evacuate => Self::evacuate(state, env),

            // ========== Events ==========
            EngineAction::Seated { .. }
            | EngineAction::Queued { .. }
            | EngineAction::Rejected { .. }
            | EngineAction::Released { .. }
            | EngineAction::ReleaseIgnored { .. }
            | EngineAction::ReservationCompleted(_)
            | EngineAction::ClassThreeDoubled { .. }
            | EngineAction::DoublingIgnored
            | EngineAction::Evacuated { .. } => SmallVec::new(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::channel::ReplyKey;
    use crate::mocks::{FirstPicker, RecordingOutbox};
    use crate::state::{StateLimits, TableLayout};
    use crate::types::{RequesterId, TableClass, TableRef};
    use tavern_testing::{ReducerTest, assertions, drain_effects};

    fn size(n: u8) -> PartySize {
        PartySize::new(n).unwrap()
    }

    fn party(n: u32) -> PartyId {
        PartyId::new(n)
    }

    fn env_with(outbox: &Arc<RecordingOutbox>, alarm: FireAlarm) -> SeatingEnvironment {
        SeatingEnvironment::new(outbox.clone(), alarm, Arc::new(FirstPicker))
    }

    fn state(layout: TableLayout, waiting: usize) -> AllocationState {
        AllocationState::new(
            layout,
            StateLimits {
                waiting_capacity: waiting,
                party_index_capacity: 100,
            },
        )
    }

    #[test]
    fn request_on_free_table_seats_party() {
        let outbox = Arc::new(RecordingOutbox::new());
        ReducerTest::new(SeatingReducer)
            .with_env(env_with(&outbox, FireAlarm::new()))
            .given_state(state(TableLayout::new(1, 0, 0, 0), 1))
            .when_action(EngineAction::RequestSeat { party: party(1), size: size(1) })
            .then_state(|s| {
                assert_eq!(s.free_seats(), 0);
                assert_eq!(
                    s.placement(PartyId::new(1)).map(|p| p.table),
                    Some(TableRef::new(TableClass::One, 0))
                );
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn events_are_no_ops() {
        let outbox = Arc::new(RecordingOutbox::new());
        ReducerTest::new(SeatingReducer)
            .with_env(env_with(&outbox, FireAlarm::new()))
            .given_state(state(TableLayout::new(1, 0, 0, 0), 1))
            .when_action(EngineAction::DoublingIgnored)
            .then_state(|s| assert_eq!(s.free_seats(), 1))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[tokio::test]
    async fn seat_reply_goes_to_party() {
        let outbox = Arc::new(RecordingOutbox::new());
        let env = env_with(&outbox, FireAlarm::new());
        let mut s = state(TableLayout::new(0, 1, 0, 0), 1);

        let effects = SeatingReducer.reduce(&mut s, EngineAction::RequestSeat { party: party(3), size: size(2) }, &env);
        let events = drain_effects(effects).await;

        let table = TableRef::new(TableClass::Two, 0);
        assert_eq!(
            events,
            vec![EngineAction::Seated { party: party(3), size: size(2), table, from_queue: false }]
        );
        assert_eq!(
            outbox.take_for(ReplyKey::Seat(party(3))),
            vec![Message::SeatReply(SeatReply::seated(party(3), size(2), table))]
        );
    }

    #[tokio::test]
    async fn full_queue_rejects_with_sentinel() {
        let outbox = Arc::new(RecordingOutbox::new());
        let env = env_with(&outbox, FireAlarm::new());
        let mut s = state(TableLayout::new(1, 0, 0, 0), 1);

        for id in 1..=3 {
            let effects = SeatingReducer.reduce(&mut s, EngineAction::RequestSeat { party: party(id), size: size(1) }, &env);
            drain_effects(effects).await;
        }

        assert_eq!(s.waiting_len(), 1);
        assert!(outbox.take_for(ReplyKey::Seat(party(2))).is_empty());
        let rejected = outbox.take_for(ReplyKey::Seat(party(3)));
        assert_eq!(rejected, vec![Message::SeatReply(SeatReply::rejected(party(3), size(1)))]);
    }

    #[tokio::test]
    async fn release_admits_waiter_in_order() {
        let outbox = Arc::new(RecordingOutbox::new());
        let env = env_with(&outbox, FireAlarm::new());
        let mut s = state(TableLayout::new(1, 0, 0, 0), 5);

        for id in 1..=2 {
            let effects = SeatingReducer.reduce(&mut s, EngineAction::RequestSeat { party: party(id), size: size(1) }, &env);
            drain_effects(effects).await;
        }

        let effects = SeatingReducer.reduce(&mut s, EngineAction::ReturnDishes { party: party(1), size: size(1) }, &env);
        let events = drain_effects(effects).await;

        let table = TableRef::new(TableClass::One, 0);
        assert_eq!(
            events,
            vec![
                EngineAction::Released { party: party(1), size: size(1), table },
                EngineAction::Seated { party: party(2), size: size(1), table, from_queue: true },
            ]
        );
        assert_eq!(s.dirty_dishes(), 1);
        s.check_invariants().unwrap();
    }

    #[tokio::test]
    async fn unknown_dish_return_is_ignored() {
        let outbox = Arc::new(RecordingOutbox::new());
        let env = env_with(&outbox, FireAlarm::new());
        let mut s = state(TableLayout::new(1, 0, 0, 0), 5);

        let effects = SeatingReducer.reduce(&mut s, EngineAction::ReturnDishes { party: party(8), size: size(1) }, &env);
        assert_eq!(drain_effects(effects).await, vec![EngineAction::ReleaseIgnored { party: party(8) }]);
        assert_eq!(s.free_seats(), 1);
    }

    #[tokio::test]
    async fn reservation_reports_to_requester() {
        let outbox = Arc::new(RecordingOutbox::new());
        let env = env_with(&outbox, FireAlarm::new());
        let mut s = state(TableLayout::new(2, 0, 0, 1), 5);
        let manager = RequesterId::new(1);

        let effects = SeatingReducer.reduce(&mut s, EngineAction::ReserveSeats { requested_by: manager, count: 2 }, &env);
        let events = drain_effects(effects).await;

        let replies = outbox.take_for(ReplyKey::Reservation(manager));
        let [Message::ReservationReport(report)] = replies.as_slice() else {
            panic!("expected one report, got {replies:?}");
        };
        assert_eq!(report.reserved_seats, 4);
        assert_eq!(events, vec![EngineAction::ReservationCompleted(report.clone())]);
    }

    #[tokio::test]
    async fn doubling_admits_waiters_once() {
        let outbox = Arc::new(RecordingOutbox::new());
        let env = env_with(&outbox, FireAlarm::new());
        let mut s = state(TableLayout::new(0, 0, 1, 0), 5);

        for id in 1..=2 {
            let effects = SeatingReducer.reduce(&mut s, EngineAction::RequestSeat { party: party(id), size: size(3) }, &env);
            drain_effects(effects).await;
        }
        assert_eq!(s.waiting_len(), 1);

        let effects = SeatingReducer.reduce(&mut s, EngineAction::DoubleClassThree, &env);
        let events = drain_effects(effects).await;
        assert_eq!(events[0], EngineAction::ClassThreeDoubled { added_seats: 3 });
        assert!(matches!(events[1], EngineAction::Seated { from_queue: true, .. }));

        let effects = SeatingReducer.reduce(&mut s, EngineAction::DoubleClassThree, &env);
        assert_eq!(drain_effects(effects).await, vec![EngineAction::DoublingIgnored]);
        s.check_invariants().unwrap();
    }

    #[tokio::test]
    async fn raised_alarm_rejects_and_drains_queue() {
        let outbox = Arc::new(RecordingOutbox::new());
        let alarm = FireAlarm::new();
        let env = env_with(&outbox, alarm.clone());
        let mut s = state(TableLayout::new(1, 0, 0, 0), 5);

        for id in 1..=2 {
            let effects = SeatingReducer.reduce(&mut s, EngineAction::RequestSeat { party: party(id), size: size(1) }, &env);
            drain_effects(effects).await;
        }

        alarm.raise();
        let effects = SeatingReducer.reduce(&mut s, EngineAction::RequestSeat { party: party(3), size: size(1) }, &env);
        let events = drain_effects(effects).await;

        assert!(s.is_evacuating());
        assert_eq!(s.waiting_len(), 0);
        assert_eq!(
            events,
            vec![
                EngineAction::Rejected { party: party(2), size: size(1), reason: RejectReason::Evacuating },
                EngineAction::Evacuated { drained: 1 },
                EngineAction::Rejected { party: party(3), size: size(1), reason: RejectReason::Evacuating },
            ]
        );
        assert_eq!(outbox.take_for(ReplyKey::Seat(party(2))).len(), 1);
    }

    #[tokio::test]
    async fn release_after_alarm_turns_waiter_away() {
        let outbox = Arc::new(RecordingOutbox::new());
        let alarm = FireAlarm::new();
        let env = env_with(&outbox, alarm.clone());
        let mut s = state(TableLayout::new(1, 0, 0, 0), 5);

        for id in 1..=2 {
            let effects = SeatingReducer.reduce(&mut s, EngineAction::RequestSeat { party: party(id), size: size(1) }, &env);
            drain_effects(effects).await;
        }

        alarm.raise();
        let effects = SeatingReducer.reduce(&mut s, EngineAction::ReturnDishes { party: party(1), size: size(1) }, &env);
        let events = drain_effects(effects).await;

        let table = TableRef::new(TableClass::One, 0);
        assert_eq!(
            events,
            vec![
                EngineAction::Released { party: party(1), size: size(1), table },
                EngineAction::Rejected { party: party(2), size: size(1), reason: RejectReason::Evacuating },
                EngineAction::Evacuated { drained: 1 },
            ]
        );
        assert_eq!(s.placement(party(2)), None);
        assert!(s.is_evacuating());
        assert_eq!(s.free_seats(), 1);
        assert_eq!(
            outbox.take_for(ReplyKey::Seat(party(2))),
            vec![Message::SeatReply(SeatReply::rejected(party(2), size(1)))]
        );
        s.check_invariants().unwrap();
    }

    #[tokio::test]
    async fn doubling_after_alarm_turns_waiter_away() {
        let outbox = Arc::new(RecordingOutbox::new());
        let alarm = FireAlarm::new();
        let env = env_with(&outbox, alarm.clone());
        let mut s = state(TableLayout::new(0, 0, 1, 0), 5);

        for id in 1..=2 {
            let effects = SeatingReducer.reduce(&mut s, EngineAction::RequestSeat { party: party(id), size: size(3) }, &env);
            drain_effects(effects).await;
        }

        alarm.raise();
        let effects = SeatingReducer.reduce(&mut s, EngineAction::DoubleClassThree, &env);
        let events = drain_effects(effects).await;

        assert_eq!(
            events,
            vec![
                EngineAction::ClassThreeDoubled { added_seats: 3 },
                EngineAction::Rejected { party: party(2), size: size(3), reason: RejectReason::Evacuating },
                EngineAction::Evacuated { drained: 1 },
            ]
        );
        assert_eq!(s.placement(party(2)), None);
        assert_eq!(s.seated_parties(), 1);
        assert_eq!(s.free_seats(), 3);
        s.check_invariants().unwrap();
    }
}
