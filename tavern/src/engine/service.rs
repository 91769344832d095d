//! The engine service loop: turns channel messages and control events into
//! reducer commands on the seating `Store`.

use super::actions::EngineAction;
use super::reducer::{SeatingEnvironment, SeatingReducer};
use crate::alarm::FireAlarm;
use crate::channel::{ChannelError, Message, MessageKind, MessageQueue, Selector};
use crate::state::AllocationState;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tavern_runtime::{Store, StoreError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// The engine's store
pub type SeatingStore = Store<AllocationState, EngineAction, SeatingEnvironment, SeatingReducer>;

/// Message kinds the engine consumes
pub const ENGINE_KINDS: &[MessageKind] = &[
    MessageKind::SeatRequest,
    MessageKind::DishesReturned,
    MessageKind::ReserveSeats,
];

/// Out-of-band events for the engine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlEvent {
    /// Double the three-seat pool
    DoubleClassThree,
    /// Stop serving
    Shutdown,
}

/// How the engine waits for work
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiveDiscipline {
    /// Block until any engine message arrives
    Blocking,
    /// Drain seat requests, then dish returns, then reservations without
    /// blocking, sleeping `interval` whenever all three are empty
    Polling {
        /// Pause between empty polls
        interval: Duration,
    },
}

impl Default for ReceiveDiscipline {
    fn default() -> Self {
        Self::Blocking
    }
}

impl FromStr for ReceiveDiscipline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blocking" => Ok(Self::Blocking),
            "polling" => Ok(Self::Polling {
                interval: Duration::from_millis(10),
            }),
            other => Err(format!("unknown receive discipline '{other}'")),
        }
    }
}

/// Why the service loop stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceExit {
    /// A `Shutdown` control event arrived
    Shutdown,
    /// Every control sender is gone
    ControlClosed,
    /// The request channel closed
    ChannelClosed,
    /// The store stopped accepting actions
    StoreStopped,
}

/// Runs the seating engine
pub struct SeatingService {
    store: SeatingStore,
    channel: MessageQueue,
    control: mpsc::UnboundedReceiver<ControlEvent>,
    alarm: FireAlarm,
    discipline: ReceiveDiscipline,
}

impl SeatingService {
    /// Creates a new `SeatingService`
    #[must_use]
    pub const fn new(
        store: SeatingStore,
        channel: MessageQueue,
        control: mpsc::UnboundedReceiver<ControlEvent>,
        alarm: FireAlarm,
        discipline: ReceiveDiscipline,
    ) -> Self {
        Self {
            store,
            channel,
            control,
            alarm,
            discipline,
        }
    }

    /// Serve until shutdown
    ///
    /// When the fire alarm goes off the engine evacuates and keeps answering
    /// (with rejections) until told to shut down, so nobody is left waiting.
    pub async fn run(self) -> ServiceExit {
        let Self {
            store,
            channel,
            mut control,
            alarm,
            discipline,
        } = self;
        info!(?discipline, "Seating engine started");
        let mut fire = alarm.subscribe();
        let mut evacuated = false;

        let exit = loop {
            let step = tokio::select! {
                biased;

                event = control.recv() => match event {
                    Some(ControlEvent::DoubleClassThree) => Self::dispatch(&store, EngineAction::DoubleClassThree).await,
                    Some(ControlEvent::Shutdown) => Err(ServiceExit::Shutdown),
                    None => Err(ServiceExit::ControlClosed),
                },

                () = fire.raised(), if !evacuated => {
                    evacuated = true;
                    Self::dispatch(&store, EngineAction::Evacuate).await
                },

                message = Self::next_message(&channel, discipline) => match message {
                    Ok(message) => Self::handle(&store, message).await,
                    Err(ChannelError::Closed) => Err(ServiceExit::ChannelClosed),
                },
            };

            if let Err(exit) = step {
                break exit;
            }
        };

        info!(?exit, "Seating engine stopped");
        exit
    }

    async fn next_message(
        channel: &MessageQueue,
        discipline: ReceiveDiscipline,
    ) -> Result<Message, ChannelError> {
        match discipline {
            ReceiveDiscipline::Blocking => channel.recv(Selector::AnyOf(ENGINE_KINDS)).await,
            ReceiveDiscipline::Polling { interval } => loop {
                for kind in ENGINE_KINDS {
                    if let Some(message) = channel.try_recv(Selector::Kind(*kind))? {
                        return Ok(message);
                    }
                }
                tokio::time::sleep(interval).await;
            },
        }
    }

    async fn handle(store: &SeatingStore, message: Message) -> Result<(), ServiceExit> {
        let action = match message {
            Message::SeatRequest { party, size } => EngineAction::RequestSeat { party, size },
            Message::DishesReturned { party, size } => EngineAction::ReturnDishes { party, size },
            Message::ReserveSeats {
                requested_by,
                count,
            } => EngineAction::ReserveSeats {
                requested_by,
                count,
            },
            other => {
                warn!(kind = ?other.kind(), "Engine received a message it does not handle");
                return Ok(());
            },
        };
        Self::dispatch(store, action).await
    }

    async fn dispatch(store: &SeatingStore, action: EngineAction) -> Result<(), ServiceExit> {
        debug!(?action, "Dispatching");
        match store.send(action).await {
            Ok(_) => Ok(()),
            Err(StoreError::ShutdownInProgress) => Err(ServiceExit::StoreStopped),
            Err(error) => {
                warn!(%error, "Engine store refused action");
                Ok(())
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::channel::ReplyKey;
    use crate::mocks::FirstPicker;
    use crate::state::{StateLimits, TableLayout};
    use crate::types::{PartyId, PartySize, SeatReply, TableClass, TableRef};
    use std::sync::Arc;

    struct Harness {
        channel: MessageQueue,
        control: mpsc::UnboundedSender<ControlEvent>,
        alarm: FireAlarm,
        store: SeatingStore,
        service: tokio::task::JoinHandle<ServiceExit>,
    }

    fn start(layout: TableLayout, discipline: ReceiveDiscipline) -> Harness {
        let channel = MessageQueue::new();
        let alarm = FireAlarm::new();
        let (control, control_rx) = mpsc::unbounded_channel();
        let env = SeatingEnvironment::new(Arc::new(channel.clone()), alarm.clone(), Arc::new(FirstPicker));
        let store = Store::new(AllocationState::new(layout, StateLimits::default()), SeatingReducer, env);
        let service = SeatingService::new(store.clone(), channel.clone(), control_rx, alarm.clone(), discipline);
        Harness {
            channel,
            control,
            alarm,
            store,
            service: tokio::spawn(service.run()),
        }
    }

    async fn seat_reply(channel: &MessageQueue, id: u32) -> Message {
        let selector = Selector::Reply(ReplyKey::Seat(PartyId::new(id)));
        tokio::time::timeout(Duration::from_secs(1), channel.recv(selector))
            .await
            .unwrap()
            .unwrap()
    }

    fn request(id: u32, size: u8) -> Message {
        Message::SeatRequest {
            party: PartyId::new(id),
            size: PartySize::new(size).unwrap(),
        }
    }

    #[test]
    fn discipline_parses() {
        assert_eq!("Blocking".parse::<ReceiveDiscipline>(), Ok(ReceiveDiscipline::Blocking));
        assert!(matches!("polling".parse::<ReceiveDiscipline>(), Ok(ReceiveDiscipline::Polling { .. })));
        assert!("spin".parse::<ReceiveDiscipline>().is_err());
    }

    #[tokio::test]
    async fn blocking_service_answers_requests() {
        let h = start(TableLayout::new(1, 0, 0, 0), ReceiveDiscipline::Blocking);
        h.channel.send(request(1, 1)).unwrap();

        let expected = SeatReply::seated(PartyId::new(1), PartySize::new(1).unwrap(), TableRef::new(TableClass::One, 0));
        assert_eq!(seat_reply(&h.channel, 1).await, Message::SeatReply(expected));

        h.control.send(ControlEvent::Shutdown).unwrap();
        assert_eq!(h.service.await.unwrap(), ServiceExit::Shutdown);
    }

    #[tokio::test]
    async fn polling_service_answers_requests() {
        let discipline = ReceiveDiscipline::Polling {
            interval: Duration::from_millis(1),
        };
        let h = start(TableLayout::new(0, 1, 0, 0), discipline);
        h.channel.send(request(1, 2)).unwrap();

        let Message::SeatReply(reply) = seat_reply(&h.channel, 1).await else {
            unreachable!("selector only yields seat replies");
        };
        assert!(reply.is_seated());

        h.channel.close();
        assert_eq!(h.service.await.unwrap(), ServiceExit::ChannelClosed);
    }

    #[tokio::test]
    async fn control_doubling_reaches_state() {
        let h = start(TableLayout::new(0, 0, 2, 0), ReceiveDiscipline::Blocking);
        let mut events = h.store.subscribe_actions();
        h.control.send(ControlEvent::DoubleClassThree).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv()).await.unwrap().unwrap();
        assert_eq!(event, EngineAction::ClassThreeDoubled { added_seats: 6 });
        assert_eq!(h.store.state(AllocationState::free_seats).await, 12);

        drop(h.control);
        assert_eq!(h.service.await.unwrap(), ServiceExit::ControlClosed);
    }

    #[tokio::test]
    async fn fire_rejects_queued_party() {
        let h = start(TableLayout::new(1, 0, 0, 0), ReceiveDiscipline::Blocking);
        h.channel.send(request(1, 1)).unwrap();
        seat_reply(&h.channel, 1).await;

        let mut events = h.store.subscribe_actions();
        h.channel.send(request(2, 1)).unwrap();
        let queued = tokio::time::timeout(Duration::from_secs(1), events.recv()).await.unwrap().unwrap();
        assert!(matches!(queued, EngineAction::Queued { .. }));

        h.alarm.raise();
        let Message::SeatReply(reply) = seat_reply(&h.channel, 2).await else {
            unreachable!("selector only yields seat replies");
        };
        assert!(!reply.is_seated());
        assert!(h.store.state(AllocationState::is_evacuating).await);

        h.control.send(ControlEvent::Shutdown).unwrap();
        assert_eq!(h.service.await.unwrap(), ServiceExit::Shutdown);
    }
}
