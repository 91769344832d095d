//! A party of guests: ask for a table, pay, eat, return the dishes.

use crate::alarm::{FireAlarm, FireWatch};
use crate::channel::{ChannelError, Message, MessageQueue, ReplyKey, Selector};
use crate::types::{PartyId, PartySize, TableRef};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How a party's visit ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartyOutcome {
    /// Walked in and left without ordering
    LeftWithoutOrdering,
    /// Turned away without a table
    Rejected,
    /// Ate and returned the dishes
    Served {
        /// Where it sat
        table: TableRef,
    },
    /// Left because of the fire alarm
    Evacuated,
    /// The request channel closed under it
    Abandoned,
}

/// One party's visit
#[derive(Debug)]
pub struct Party {
    id: PartyId,
    size: PartySize,
    orders: bool,
    channel: MessageQueue,
    alarm: FireAlarm,
    eating_time: Duration,
}

/// Why a visit stopped early
enum Interrupted {
    Fire,
    Closed,
}

impl From<ChannelError> for Interrupted {
    fn from(_: ChannelError) -> Self {
        Self::Closed
    }
}

impl From<Interrupted> for PartyOutcome {
    fn from(interrupted: Interrupted) -> Self {
        match interrupted {
            Interrupted::Fire => Self::Evacuated,
            Interrupted::Closed => Self::Abandoned,
        }
    }
}

impl Party {
    /// Creates a new `Party`
    #[must_use]
    pub const fn new(
        id: PartyId,
        size: PartySize,
        orders: bool,
        channel: MessageQueue,
        alarm: FireAlarm,
        eating_time: Duration,
    ) -> Self {
        Self {
            id,
            size,
            orders,
            channel,
            alarm,
            eating_time,
        }
    }

    /// This party's id
    #[must_use]
    pub const fn id(&self) -> PartyId {
        self.id
    }

    /// Go through the visit
    pub async fn run(self) -> PartyOutcome {
        info!(size = %self.size, "Party walks in");
        if !self.orders {
            info!("Party leaves without ordering");
            return PartyOutcome::LeftWithoutOrdering;
        }

        let mut fire = self.alarm.subscribe();
        let outcome = match self.visit(&mut fire).await {
            Ok(outcome) => outcome,
            Err(interrupted) => interrupted.into(),
        };
        match outcome {
            PartyOutcome::Evacuated => warn!("Fire! Party evacuates"),
            PartyOutcome::Abandoned => warn!("Request channel closed, party leaves"),
            _ => return outcome,
        }
        // Left mid-visit: whatever the engine or cashier still sends is unread
        self.channel.abandon(ReplyKey::Seat(self.id));
        self.channel.abandon(ReplyKey::Payment(self.id));
        outcome
    }

    async fn visit(&self, fire: &mut FireWatch) -> Result<PartyOutcome, Interrupted> {
        self.channel.send(Message::SeatRequest {
            party: self.id,
            size: self.size,
        })?;

        let Message::SeatReply(reply) = self.await_reply(fire, ReplyKey::Seat(self.id)).await? else {
            return Ok(PartyOutcome::Rejected);
        };
        let Some(table) = reply.table else {
            info!("No table, party leaves without being served");
            return Ok(PartyOutcome::Rejected);
        };

        info!(%table, "Table assigned, paying");
        self.channel.send(Message::Payment {
            party: self.id,
            size: self.size,
            table,
        })?;
        self.await_reply(fire, ReplyKey::Payment(self.id)).await?;

        if self.alarm.is_raised() {
            return Err(Interrupted::Fire);
        }
        debug!(%table, "Eating");
        tokio::select! {
            biased;
            () = fire.raised() => return Err(Interrupted::Fire),
            () = tokio::time::sleep(self.eating_time) => {},
        }

        self.channel.send(Message::DishesReturned {
            party: self.id,
            size: self.size,
        })?;
        info!(%table, "Dishes returned, party leaves");
        Ok(PartyOutcome::Served { table })
    }

    async fn await_reply(&self, fire: &mut FireWatch, key: ReplyKey) -> Result<Message, Interrupted> {
        tokio::select! {
            biased;
            () = fire.raised() => Err(Interrupted::Fire),
            reply = self.channel.recv(Selector::Reply(key)) => Ok(reply?),
        }
    }
}
