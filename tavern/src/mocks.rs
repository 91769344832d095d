//! Test doubles for the engine's environment.
//!
//! Used by unit tests and by the integration tests under `tests/`.

use crate::channel::{ChannelError, Message, Outbox, ReplyKey};
use crate::engine::SlotPicker;
use std::sync::{Mutex, PoisonError};

/// Outbox that records every delivered message
#[derive(Debug, Default)]
pub struct RecordingOutbox {
    delivered: Mutex<Vec<Message>>,
}

impl RecordingOutbox {
    /// Empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far, in order
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return the messages addressed to `key`
    pub fn take_for(&self, key: ReplyKey) -> Vec<Message> {
        let mut delivered = self.delivered.lock().unwrap_or_else(PoisonError::into_inner);
        let (taken, kept) = delivered
            .drain(..)
            .partition(|message| message.reply_key() == Some(key));
        *delivered = kept;
        taken
    }
}

impl Outbox for RecordingOutbox {
    fn deliver(&self, message: Message) -> Result<(), ChannelError> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
        Ok(())
    }
}

/// Picker that always takes the first candidate
#[derive(Clone, Copy, Debug, Default)]
pub struct FirstPicker;

impl SlotPicker for FirstPicker {
    fn pick(&self, _upper: usize) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PartyId;

    #[test]
    fn take_for_leaves_other_replies() {
        let outbox = RecordingOutbox::new();
        let first = PartyId::new(1);
        let second = PartyId::new(2);
        outbox.deliver(Message::PaymentAck { party: first }).ok();
        outbox.deliver(Message::PaymentAck { party: second }).ok();

        assert_eq!(
            outbox.take_for(ReplyKey::Payment(second)),
            vec![Message::PaymentAck { party: second }]
        );
        assert_eq!(outbox.messages(), vec![Message::PaymentAck { party: first }]);
    }
}
