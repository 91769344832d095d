//! The request channel: one ordered mailbox multiplexing every message kind.
//!
//! Consumers pick messages with a [`Selector`]. Messages matching one
//! selector come out in the order they were sent. Replies are routed by a
//! typed [`ReplyKey`] so exactly one waiting consumer takes each reply.
//! A consumer that gives up on its replies [abandons](MessageQueue::abandon)
//! the key, and replies to it are dropped instead of queued.

use crate::types::{PartyId, PartySize, RequesterId, ReservationReport, SeatReply, TableRef};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::debug;

/// Errors from the request channel
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel was closed; nothing more will be delivered
    #[error("request channel closed")]
    Closed,
}

/// Discriminant of a [`Message`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// A party asks for a table
    SeatRequest,
    /// Engine answers a seat request
    SeatReply,
    /// A party leaves and frees its seats
    DishesReturned,
    /// The manager withdraws seats
    ReserveSeats,
    /// A party pays the cashier
    Payment,
    /// Cashier confirms a payment
    PaymentAck,
    /// Engine answers a reservation
    ReservationReport,
}

/// Destination of a reply
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplyKey {
    /// Seat reply for a party
    Seat(PartyId),
    /// Payment acknowledgment for a party
    Payment(PartyId),
    /// Reservation report for a requester
    Reservation(RequesterId),
}

/// Everything that travels over the request channel
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// A party asks for a table
    SeatRequest {
        /// Requesting party
        party: PartyId,
        /// Seats needed
        size: PartySize,
    },
    /// Engine answers a seat request
    SeatReply(SeatReply),
    /// A party has eaten and returns its dishes
    DishesReturned {
        /// Leaving party
        party: PartyId,
        /// Seats it held
        size: PartySize,
    },
    /// The manager withdraws seats from service
    ReserveSeats {
        /// Who asks
        requested_by: RequesterId,
        /// Seats to withdraw
        count: u32,
    },
    /// A seated party pays
    Payment {
        /// Paying party
        party: PartyId,
        /// Party size
        size: PartySize,
        /// Table it was given
        table: TableRef,
    },
    /// Cashier confirms a payment
    PaymentAck {
        /// Party that paid
        party: PartyId,
    },
    /// Engine answers a reservation
    ReservationReport(ReservationReport),
}

impl Message {
    /// Discriminant of this message
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::SeatRequest { .. } => MessageKind::SeatRequest,
            Self::SeatReply(_) => MessageKind::SeatReply,
            Self::DishesReturned { .. } => MessageKind::DishesReturned,
            Self::ReserveSeats { .. } => MessageKind::ReserveSeats,
            Self::Payment { .. } => MessageKind::Payment,
            Self::PaymentAck { .. } => MessageKind::PaymentAck,
            Self::ReservationReport(_) => MessageKind::ReservationReport,
        }
    }

    /// Reply key, for the reply kinds
    #[must_use]
    pub const fn reply_key(&self) -> Option<ReplyKey> {
        match self {
            Self::SeatReply(reply) => Some(ReplyKey::Seat(reply.party)),
            Self::PaymentAck { party } => Some(ReplyKey::Payment(*party)),
            Self::ReservationReport(report) => Some(ReplyKey::Reservation(report.requested_by)),
            _ => None,
        }
    }
}

/// Which messages a consumer wants
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selector {
    /// Messages of one kind
    Kind(MessageKind),
    /// Messages of any of these kinds
    AnyOf(&'static [MessageKind]),
    /// The reply addressed to this key
    Reply(ReplyKey),
}

impl Selector {
    /// Whether `message` matches
    #[must_use]
    pub fn matches(&self, message: &Message) -> bool {
        match self {
            Self::Kind(kind) => message.kind() == *kind,
            Self::AnyOf(kinds) => kinds.contains(&message.kind()),
            Self::Reply(key) => message.reply_key() == Some(*key),
        }
    }
}

/// Where the engine hands its replies
pub trait Outbox: Send + Sync {
    /// Deliver `message` to whoever waits for it
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] once the transport is gone.
    fn deliver(&self, message: Message) -> Result<(), ChannelError>;
}

#[derive(Default)]
struct Mailbox {
    messages: VecDeque<Message>,
    // One entry per departed consumer
    abandoned: HashSet<ReplyKey>,
}

struct Inner {
    mailbox: Mutex<Mailbox>,
    arrived: Notify,
    closed: AtomicBool,
}

/// Multiplexed FIFO mailbox shared by every role
///
/// Cloning yields another handle to the same mailbox.
#[derive(Clone)]
pub struct MessageQueue {
    inner: Arc<Inner>,
}

impl MessageQueue {
    /// Empty, open channel
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                mailbox: Mutex::new(Mailbox::default()),
                arrived: Notify::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Append a message and wake every waiting consumer
    ///
    /// A reply whose key was abandoned is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] after [`close`](Self::close).
    pub fn send(&self, message: Message) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        {
            let mut mailbox = self.lock();
            if let Some(key) = message.reply_key().filter(|key| mailbox.abandoned.contains(key)) {
                debug!(?key, "Nobody waits for this reply, dropped");
                return Ok(());
            }
            mailbox.messages.push_back(message);
        }
        self.inner.arrived.notify_waiters();
        Ok(())
    }

    /// Give up on every reply addressed to `key`
    ///
    /// Replies already queued for `key` are removed and later ones are
    /// dropped on arrival. Returns how many queued replies were removed.
    pub fn abandon(&self, key: ReplyKey) -> usize {
        let mut mailbox = self.lock();
        mailbox.abandoned.insert(key);
        let before = mailbox.messages.len();
        mailbox.messages.retain(|message| message.reply_key() != Some(key));
        before - mailbox.messages.len()
    }

    /// Take the oldest message matching `selector`, waiting until one arrives
    ///
    /// Cancel-safe: dropping the future loses no message.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] when the channel is closed and holds
    /// no matching message.
    pub async fn recv(&self, selector: Selector) -> Result<Message, ChannelError> {
        loop {
            let arrived = self.inner.arrived.notified();
            tokio::pin!(arrived);
            // Register before checking so a send between the check and the
            // await still wakes us
            arrived.as_mut().enable();

            if let Some(message) = self.take(selector) {
                return Ok(message);
            }
            if self.is_closed() {
                return Err(ChannelError::Closed);
            }

            arrived.await;
        }
    }

    /// Take the oldest message matching `selector` without waiting
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] when the channel is closed and holds
    /// no matching message.
    pub fn try_recv(&self, selector: Selector) -> Result<Option<Message>, ChannelError> {
        match self.take(selector) {
            Some(message) => Ok(Some(message)),
            None if self.is_closed() => Err(ChannelError::Closed),
            None => Ok(None),
        }
    }

    /// Stop accepting messages and wake every consumer
    ///
    /// Messages already queued can still be received.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.arrived.notify_waiters();
    }

    /// Whether [`close`](Self::close) was called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Messages currently queued
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    /// Whether no message is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().messages.is_empty()
    }

    fn take(&self, selector: Selector) -> Option<Message> {
        let mut mailbox = self.lock();
        let position = mailbox.messages.iter().position(|m| selector.matches(m))?;
        mailbox.messages.remove(position)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Mailbox> {
        self.inner.mailbox.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageQueue")
            .field("queued", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Outbox for MessageQueue {
    fn deliver(&self, message: Message) -> Result<(), ChannelError> {
        self.send(message)
    }
}
