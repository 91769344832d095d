//! The manager: fires the scheduled interventions.
//!
//! The coordinator is a reducer run by its own `Store`. `Start` schedules
//! one delayed trigger per configured offset; each trigger stamps its time
//! and performs its side effect in an `Effect::Future`.

use crate::alarm::FireAlarm;
use crate::channel::{Message, MessageQueue, ReplyKey, Selector};
use crate::engine::ControlEvent;
use crate::types::{RequesterId, ReservationReport};
use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use tavern_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer, smallvec};
use tavern_runtime::Store;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// When the manager steps in, as offsets from `Start`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoordinatorSchedule {
    /// Double the three-seat tables
    pub doubling_at: Option<Duration>,
    /// Reserve seats
    pub reservation_at: Option<Duration>,
    /// Raise the fire alarm
    pub fire_at: Option<Duration>,
    /// Seats to reserve
    pub reservation_seats: u32,
    /// Identity used for the reservation reply
    pub requester: RequesterId,
    /// How long to wait for the engine's reservation report
    pub reply_timeout: Duration,
}

impl Default for CoordinatorSchedule {
    fn default() -> Self {
        Self {
            doubling_at: Some(Duration::from_secs(10)),
            reservation_at: Some(Duration::from_secs(15)),
            fire_at: Some(Duration::from_secs(29)),
            reservation_seats: 2,
            requester: RequesterId::new(1),
            reply_timeout: Duration::from_secs(5),
        }
    }
}

/// What the manager has done so far
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoordinatorState {
    /// When the schedule started
    pub started_at: Option<DateTime<Utc>>,
    /// When doubling was requested
    pub doubled_at: Option<DateTime<Utc>>,
    /// When the reservation was requested
    pub reserved_at: Option<DateTime<Utc>>,
    /// When the fire alarm was raised
    pub fire_at: Option<DateTime<Utc>>,
    /// The engine's answer to the reservation
    pub report: Option<ReservationReport>,
}

/// Coordinator commands and events
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoordinatorAction {
    // Commands
    /// Start the schedule
    Start,
    /// Doubling time reached
    TriggerDoubling,
    /// Reservation time reached
    TriggerReservation,
    /// Fire time reached
    TriggerFire,

    // Events
    /// The engine was told to double
    DoublingSent,
    /// The engine answered the reservation
    ReservationReported(ReservationReport),
    /// No reservation report arrived
    ReservationFailed {
        /// Why
        reason: String,
    },
    /// The alarm was raised
    FireRaised {
        /// Whether this trigger raised it, rather than someone else first
        first: bool,
    },
}

/// Dependencies of the coordinator
#[derive(Clone)]
pub struct CoordinatorEnvironment {
    /// Timestamps for the record
    pub clock: Arc<dyn Clock>,
    /// Control channel into the engine
    pub control: mpsc::UnboundedSender<ControlEvent>,
    /// Request channel, for the reservation
    pub channel: MessageQueue,
    /// The fire alarm
    pub alarm: FireAlarm,
    /// Trigger offsets
    pub schedule: CoordinatorSchedule,
}

/// The coordinator's store
pub type CoordinatorStore =
    Store<CoordinatorState, CoordinatorAction, CoordinatorEnvironment, CoordinatorReducer>;

/// Reducer for the manager's schedule
#[derive(Clone, Copy, Debug, Default)]
pub struct CoordinatorReducer;

type Effects = SmallVec<[Effect<CoordinatorAction>; 4]>;

impl CoordinatorReducer {
    /// Creates a new `CoordinatorReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn start(state: &mut CoordinatorState, env: &CoordinatorEnvironment) -> Effects {
        if state.started_at.is_some() {
            warn!("Coordinator already started");
            return SmallVec::new();
        }
        state.started_at = Some(env.clock.now());

        let schedule = env.schedule;
        let triggers = [
            (schedule.doubling_at, CoordinatorAction::TriggerDoubling),
            (schedule.reservation_at, CoordinatorAction::TriggerReservation),
            (schedule.fire_at, CoordinatorAction::TriggerFire),
        ];
        info!(?schedule, "Coordinator started");
        triggers
            .into_iter()
            .filter_map(|(at, action)| at.map(|at| Effect::delay(at, action)))
            .collect()
    }

    fn double(state: &mut CoordinatorState, env: &CoordinatorEnvironment) -> Effects {
        if env.alarm.is_raised() || state.doubled_at.is_some() {
            return SmallVec::new();
        }
        state.doubled_at = Some(env.clock.now());
        info!("Doubling the three-seat tables");

        let control = env.control.clone();
        smallvec![Effect::future(async move {
            match control.send(ControlEvent::DoubleClassThree) {
                Ok(()) => Some(CoordinatorAction::DoublingSent),
                Err(_) => {
                    warn!("Engine control channel closed, doubling not delivered");
                    None
                },
            }
        })]
    }

    fn reserve(state: &mut CoordinatorState, env: &CoordinatorEnvironment) -> Effects {
        if env.alarm.is_raised() || state.reserved_at.is_some() {
            return SmallVec::new();
        }
        state.reserved_at = Some(env.clock.now());

        let CoordinatorSchedule {
            reservation_seats,
            requester,
            reply_timeout,
            ..
        } = env.schedule;
        info!(seats = reservation_seats, "Reserving seats");

        let channel = env.channel.clone();
        smallvec![Effect::future(async move {
            let request = Message::ReserveSeats {
                requested_by: requester,
                count: reservation_seats,
            };
            if let Err(error) = channel.send(request) {
                return Some(CoordinatorAction::ReservationFailed {
                    reason: error.to_string(),
                });
            }

            let reply = channel.recv(Selector::Reply(ReplyKey::Reservation(requester)));
            let action = match tokio::time::timeout(reply_timeout, reply).await {
                Ok(Ok(Message::ReservationReport(report))) => {
                    CoordinatorAction::ReservationReported(report)
                },
                Ok(Ok(other)) => CoordinatorAction::ReservationFailed {
                    reason: format!("unexpected reply {:?}", other.kind()),
                },
                Ok(Err(error)) => CoordinatorAction::ReservationFailed {
                    reason: error.to_string(),
                },
                Err(_) => CoordinatorAction::ReservationFailed {
                    reason: format!("no report within {reply_timeout:?}"),
                },
            };
            Some(action)
        })]
    }

    fn fire(state: &mut CoordinatorState, env: &CoordinatorEnvironment) -> Effects {
        if state.fire_at.is_some() {
            return SmallVec::new();
        }
        state.fire_at = Some(env.clock.now());

        let alarm = env.alarm.clone();
        smallvec![Effect::future(async move {
            Some(CoordinatorAction::FireRaised {
                first: alarm.raise(),
            })
        })]
    }
}

impl Reducer for CoordinatorReducer {
    type State = CoordinatorState;
    type Action = CoordinatorAction;
    type Environment = CoordinatorEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects {
        match action {
            CoordinatorAction::Start => Self::start(state, env),
            CoordinatorAction::TriggerDoubling => Self::double(state, env),
            CoordinatorAction::TriggerReservation => Self::reserve(state, env),
            CoordinatorAction::TriggerFire => Self::fire(state, env),

            CoordinatorAction::DoublingSent => SmallVec::new(),
            CoordinatorAction::ReservationReported(report) => {
                info!(
                    reserved = report.reserved_seats,
                    shortfall = report.shortfall,
                    "Reservation confirmed"
                );
                state.report = Some(report);
                SmallVec::new()
            },
            CoordinatorAction::ReservationFailed { reason } => {
                warn!(%reason, "Reservation got no report");
                SmallVec::new()
            },
            CoordinatorAction::FireRaised { first } => {
                if first {
                    warn!("FIRE! Alarm raised, everyone out");
                }
                SmallVec::new()
            },
        }
    }
}
