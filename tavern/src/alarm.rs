//! The fire alarm: a monotonic evacuation flag every role polls or awaits.

use std::sync::Arc;
use tokio::sync::watch;

/// Evacuation flag, `false` until raised and never reset
///
/// Clones share the same flag.
#[derive(Clone, Debug)]
pub struct FireAlarm {
    tx: Arc<watch::Sender<bool>>,
}

impl FireAlarm {
    /// Alarm that has not gone off
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Raise the alarm
    ///
    /// Returns `true` only for the call that actually raised it.
    pub fn raise(&self) -> bool {
        self.tx.send_if_modified(|raised| {
            if *raised {
                false
            } else {
                *raised = true;
                true
            }
        })
    }

    /// Poll point: whether the alarm has gone off
    #[must_use]
    pub fn is_raised(&self) -> bool {
        *self.tx.borrow()
    }

    /// Handle for awaiting the alarm
    ///
    /// Subscribing after the alarm went off still observes it.
    #[must_use]
    pub fn subscribe(&self) -> FireWatch {
        FireWatch {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for FireAlarm {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscription to a [`FireAlarm`]
#[derive(Clone, Debug)]
pub struct FireWatch {
    rx: watch::Receiver<bool>,
}

impl FireWatch {
    /// Resolve once the alarm is raised (immediately if it already was)
    ///
    /// Also resolves if every [`FireAlarm`] handle is gone, since nobody is
    /// left to raise it.
    pub async fn raised(&mut self) {
        let _ = self.rx.wait_for(|raised| *raised).await;
    }

    /// Whether the alarm has gone off
    #[must_use]
    pub fn is_raised(&self) -> bool {
        *self.rx.borrow()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn raise_is_monotonic() {
        let alarm = FireAlarm::new();
        assert!(!alarm.is_raised());
        assert!(alarm.raise());
        assert!(!alarm.raise());
        assert!(alarm.is_raised());
        assert!(alarm.clone().is_raised());
    }

    #[tokio::test]
    async fn waiters_wake_when_raised() {
        let alarm = FireAlarm::new();
        let mut watch = alarm.subscribe();
        let waiter = tokio::spawn(async move {
            watch.raised().await;
            watch.is_raised()
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        alarm.raise();
        assert!(tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn late_subscribers_see_the_alarm() {
        let alarm = FireAlarm::new();
        alarm.raise();
        let mut watch = alarm.subscribe();
        tokio::time::timeout(Duration::from_millis(100), watch.raised()).await.unwrap();
    }
}
