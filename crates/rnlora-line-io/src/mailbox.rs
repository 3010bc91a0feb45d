//! Single-slot rendezvous between the receive task and a waiting command.
//!
//! The producer (receive task) publishes one item and then stays blocked
//! until a consumer has taken it. That stalls framing of further bytes
//! until the previous line is drained, so at most one item is ever in
//! flight and lines cannot be reordered or pile up.
//!
//! The producer side has no timeout. Teardown must call
//! [`Mailbox::force_release`], which fails any blocked or future
//! `publish()` and `take()` with [`Error::NotConnected`].

use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use rnlora_core::error::{Error, Result};

/// A published item plus the signal that tells the producer it was taken.
struct Slot<T> {
    item: T,
    taken: oneshot::Sender<()>,
}

/// Capacity-one mailbox with blocking `publish` and timed `take`.
pub struct Mailbox<T> {
    tx: mpsc::Sender<Slot<T>>,
    rx: Mutex<mpsc::Receiver<Slot<T>>>,
    released: CancellationToken,
}

impl<T: Send> Mailbox<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Mailbox {
            tx,
            rx: Mutex::new(rx),
            released: CancellationToken::new(),
        }
    }

    /// Deposit `item` and wait until a consumer has taken it.
    ///
    /// If a previous item is still held, waits for that one to be taken
    /// first.
    pub async fn publish(&self, item: T) -> Result<()> {
        let (taken_tx, taken_rx) = oneshot::channel();
        let slot = Slot {
            item,
            taken: taken_tx,
        };

        tokio::select! {
            biased;
            _ = self.released.cancelled() => return Err(Error::NotConnected),
            sent = self.tx.send(slot) => sent.map_err(|_| Error::NotConnected)?,
        }

        tokio::select! {
            biased;
            _ = self.released.cancelled() => Err(Error::NotConnected),
            taken = taken_rx => taken.map_err(|_| Error::NotConnected),
        }
    }

    /// Wait up to `timeout` for an item.
    ///
    /// On timeout the producer is left blocked with its item still held.
    pub async fn take(&self, timeout: Duration) -> Result<T> {
        self.take_until(Instant::now() + timeout).await
    }

    /// Wait until `deadline` for an item.
    pub async fn take_until(&self, deadline: Instant) -> Result<T> {
        let mut rx = tokio::select! {
            biased;
            _ = self.released.cancelled() => return Err(Error::NotConnected),
            guard = tokio::time::timeout_at(deadline, self.rx.lock()) => {
                guard.map_err(|_| Error::Timeout)?
            }
        };

        let slot = tokio::select! {
            biased;
            _ = self.released.cancelled() => return Err(Error::NotConnected),
            received = tokio::time::timeout_at(deadline, rx.recv()) => match received {
                Ok(Some(slot)) => slot,
                Ok(None) => return Err(Error::NotConnected),
                Err(_) => return Err(Error::Timeout),
            },
        };

        // The producer may already be gone after a forced release.
        let _ = slot.taken.send(());
        Ok(slot.item)
    }

    /// Take the held item, if any, without waiting.
    ///
    /// Returns `None` if the slot is empty or another consumer is waiting.
    pub fn try_take(&self) -> Option<T> {
        let mut rx = self.rx.try_lock().ok()?;
        let slot = rx.try_recv().ok()?;
        let _ = slot.taken.send(());
        Some(slot.item)
    }

    /// Whether an item is currently held and not yet taken.
    pub fn is_occupied(&self) -> bool {
        self.tx.capacity() == 0
    }

    /// Unblock any producer or consumer, now and for good.
    pub fn force_release(&self) {
        self.released.cancel();
    }

    pub fn is_released(&self) -> bool {
        self.released.is_cancelled()
    }
}

impl<T: Send> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}
