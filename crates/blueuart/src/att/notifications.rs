//! Bounded hand-off of received notifications
//!
//! The polling context produces, the adapter consumes. A full queue drops the
//! incoming notification instead of blocking the poll loop.

use log::warn;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};

/// A Handle Value Notification (or Indication) received from a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub connection: u16,
    pub handle: u16,
    pub value: Vec<u8>,
}

pub type NotificationReceiver = Receiver<Notification>;

/// Producer side of the notification queue
#[derive(Debug)]
pub struct NotificationQueue {
    sender: SyncSender<Notification>,
    dropped: u64,
}

impl NotificationQueue {
    pub fn bounded(capacity: usize) -> (Self, NotificationReceiver) {
        let (sender, receiver) = sync_channel(capacity);
        (Self { sender, dropped: 0 }, receiver)
    }

    /// Queue a notification; false if it was dropped
    pub fn push(&mut self, notification: Notification) -> bool {
        match self.sender.try_send(notification) {
            Ok(()) => true,
            Err(TrySendError::Full(n)) => {
                self.dropped += 1;
                warn!(
                    "att: notification queue full, dropped 0x{:04x} on 0x{:04x} ({} total)",
                    n.handle, n.connection, self.dropped
                );
                false
            }
            // Nobody is listening any more
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Notifications lost to a full queue
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
