//! The cashier: takes payments one at a time and acknowledges them.

use crate::alarm::FireAlarm;
use crate::channel::{ChannelError, Message, MessageKind, MessageQueue, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Serves the payment counter
#[derive(Debug)]
pub struct Cashier {
    channel: MessageQueue,
    alarm: FireAlarm,
    payment_time: Duration,
}

impl Cashier {
    /// Creates a new `Cashier`
    #[must_use]
    pub const fn new(channel: MessageQueue, alarm: FireAlarm, payment_time: Duration) -> Self {
        Self {
            channel,
            alarm,
            payment_time,
        }
    }

    /// Take payments until the fire alarm or the channel closes
    ///
    /// Returns the number of payments acknowledged.
    pub async fn run(self) -> u32 {
        info!("Till open");
        let mut fire = self.alarm.subscribe();
        let mut processed = 0;

        loop {
            if self.alarm.is_raised() {
                break;
            }

            let received = tokio::select! {
                biased;
                () = fire.raised() => break,
                received = self.channel.recv(Selector::Kind(MessageKind::Payment)) => received,
            };

            let (party, size) = match received {
                Ok(Message::Payment { party, size, .. }) => (party, size),
                Ok(other) => {
                    warn!(kind = ?other.kind(), "Unexpected message at the till");
                    continue;
                },
                Err(ChannelError::Closed) => break,
            };
            if self.alarm.is_raised() {
                break;
            }

            debug!(%party, %size, "Payment received");
            tokio::select! {
                biased;
                () = fire.raised() => break,
                () = tokio::time::sleep(self.payment_time) => {},
            }
            if self.alarm.is_raised() {
                break;
            }

            if self.channel.send(Message::PaymentAck { party }).is_err() {
                break;
            }
            processed += 1;
            info!(%party, "Payment processed, order ready");
        }

        info!(processed, "Till closed");
        processed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::channel::ReplyKey;
    use crate::types::{PartyId, PartySize, TableClass, TableRef};

    fn payment(id: u32) -> Message {
        Message::Payment {
            party: PartyId::new(id),
            size: PartySize::new(2).unwrap(),
            table: TableRef::new(TableClass::Two, 0),
        }
    }

    #[tokio::test]
    async fn acknowledges_payments_in_order() {
        let channel = MessageQueue::new();
        let alarm = FireAlarm::new();
        let cashier = tokio::spawn(Cashier::new(channel.clone(), alarm.clone(), Duration::from_millis(1)).run());

        channel.send(payment(1)).unwrap();
        channel.send(payment(2)).unwrap();

        for id in [1, 2] {
            let ack = tokio::time::timeout(
                Duration::from_secs(1),
                channel.recv(Selector::Reply(ReplyKey::Payment(PartyId::new(id)))),
            )
            .await
            .unwrap()
            .unwrap();
            assert_eq!(ack, Message::PaymentAck { party: PartyId::new(id) });
        }

        alarm.raise();
        assert_eq!(tokio::time::timeout(Duration::from_secs(1), cashier).await.unwrap().unwrap(), 2);
    }

    #[tokio::test]
    async fn fire_during_payment_skips_ack() {
        let channel = MessageQueue::new();
        let alarm = FireAlarm::new();
        let cashier = tokio::spawn(Cashier::new(channel.clone(), alarm.clone(), Duration::from_secs(30)).run());

        channel.send(payment(1)).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        alarm.raise();

        assert_eq!(tokio::time::timeout(Duration::from_secs(1), cashier).await.unwrap().unwrap(), 0);
        assert!(channel.is_empty());
    }

    #[tokio::test]
    async fn closed_channel_stops_the_till() {
        let channel = MessageQueue::new();
        let cashier = tokio::spawn(Cashier::new(channel.clone(), FireAlarm::new(), Duration::ZERO).run());
        channel.close();
        assert_eq!(tokio::time::timeout(Duration::from_secs(1), cashier).await.unwrap().unwrap(), 0);
    }
}
