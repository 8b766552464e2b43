use crate::error::{HtdError, Result};
use crate::types::{ZoneNumber, ZoneSnapshot};
use tokio::sync::broadcast;

/// Capacity of the per-controller state update channel
pub(crate) const UPDATE_CHANNEL_CAPACITY: usize = 100;

/// Notification that a zone's displayed state should be re-read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateUpdate {
    pub zone: ZoneNumber,

    /// Snapshot the zone held when the update was sent
    pub snapshot: Option<ZoneSnapshot>,
}

/// Receiver for state updates
pub struct StateReceiver {
    rx: broadcast::Receiver<StateUpdate>,
}

impl StateReceiver {
    pub(crate) fn new(rx: broadcast::Receiver<StateUpdate>) -> Self {
        Self { rx }
    }

    /// Receive the next state update
    ///
    /// Fails with `ConnectionClosed` once every zone sharing the channel has
    /// been dropped.
    pub async fn recv(&mut self) -> Result<StateUpdate> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => HtdError::ConnectionClosed,
            broadcast::error::RecvError::Lagged(n) => HtdError::Lagged(n),
        })
    }

    /// Try to receive a state update without blocking
    ///
    /// Returns `None` if no update is available.
    pub fn try_recv(&mut self) -> Result<Option<StateUpdate>> {
        match self.rx.try_recv() {
            Ok(update) => Ok(Some(update)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(HtdError::ConnectionClosed),
            Err(broadcast::error::TryRecvError::Lagged(n)) => Err(HtdError::Lagged(n)),
        }
    }

    /// Drain every update currently queued
    pub fn drain(&mut self) -> Result<Vec<StateUpdate>> {
        let mut updates = Vec::new();
        while let Some(update) = self.try_recv()? {
            updates.push(update);
        }
        Ok(updates)
    }
}
