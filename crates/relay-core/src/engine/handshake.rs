//! Rendezvous channel between the action cycle and the reaction cycle.
//!
//! A send completes only after the receiver has taken the signal, so the
//! action cycle's store writes for an iteration happen-before the reaction
//! cycle's evaluation of that iteration. Dropping either end makes the other
//! end observe abandonment.

use tokio::sync::{mpsc, oneshot};

/// Token passed from the action cycle to the reaction cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// One poll finished and its writes are visible.
    CycleComplete,
    /// The workflow was deactivated or removed.
    Terminated,
}

/// The peer end was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("handshake peer is gone")]
pub struct Abandoned;

type Envelope = (Signal, oneshot::Sender<()>);

pub fn channel() -> (SignalSender, SignalReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (SignalSender { tx }, SignalReceiver { rx })
}

#[derive(Debug)]
pub struct SignalSender {
    tx: mpsc::Sender<Envelope>,
}

impl SignalSender {
    /// Send a signal and wait until the receiver has taken it.
    pub async fn send(&self, signal: Signal) -> Result<(), Abandoned> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx.send((signal, ack_tx)).await.map_err(|_| Abandoned)?;
        ack_rx.await.map_err(|_| Abandoned)
    }
}

#[derive(Debug)]
pub struct SignalReceiver {
    rx: mpsc::Receiver<Envelope>,
}

impl SignalReceiver {
    /// Wait for the next signal. `None` once the sender is gone.
    pub async fn recv(&mut self) -> Option<Signal> {
        let (signal, ack) = self.rx.recv().await?;
        // The sender may have been cancelled while waiting; nothing to do then.
        let _ = ack.send(());
        Some(signal)
    }
}
