//! Single-slot, non-blocking "run a throughput check soon" signal.
//!
//! At most one trigger is pending at a time. Posting while one is already
//! pending drops the new one, so bursts of high latency collapse into a
//! single early throughput check.

use tokio::sync::mpsc::{self, error::TrySendError};

/// Create a connected sender/receiver pair.
pub fn channel() -> (TriggerSender, TriggerReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (TriggerSender { tx }, TriggerReceiver { rx })
}

#[derive(Debug, Clone)]
pub struct TriggerSender {
    tx: mpsc::Sender<()>,
}

impl TriggerSender {
    /// Post a trigger without waiting. Returns `false` if it was coalesced
    /// into an already pending one (or nobody is listening any more).
    pub fn post(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) | Err(TrySendError::Closed(())) => false,
        }
    }
}

#[derive(Debug)]
pub struct TriggerReceiver {
    rx: mpsc::Receiver<()>,
}

impl TriggerReceiver {
    /// Wait for the next trigger. Cancel-safe; `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<()> {
        self.rx.recv().await
    }

    /// Drain a pending trigger if there is one.
    pub fn try_recv(&mut self) -> bool {
        self.rx.try_recv().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_post_is_coalesced() {
        let (tx, mut rx) = channel();

        assert!(tx.post());
        assert!(!tx.post());

        assert!(rx.try_recv());
        assert!(!rx.try_recv());
    }

    #[test]
    fn test_slot_frees_after_drain() {
        let (tx, mut rx) = channel();

        assert!(tx.post());
        assert!(rx.try_recv());
        assert!(tx.post());
        assert!(rx.try_recv());
    }

    #[test]
    fn test_post_after_receiver_dropped() {
        let (tx, rx) = channel();
        drop(rx);
        assert!(!tx.post());
    }

    #[tokio::test]
    async fn test_recv_ends_when_senders_gone() {
        let (tx, mut rx) = channel();
        tx.post();
        drop(tx);
        assert_eq!(rx.recv().await, Some(()));
        assert_eq!(rx.recv().await, None);
    }
}
