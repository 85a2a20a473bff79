// channel.rs - Unbuffered rendezvous channel on top of tokio mpsc
//
// A send completes only once the receiver has taken the value, so two tasks
// that both send to each other before receiving will wait forever. The halo
// protocol relies on exactly this behaviour.

use tokio::sync::{mpsc, oneshot};

/// The other end has been dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnected;

pub fn rendezvous<T>() -> (RendezvousSender<T>, RendezvousReceiver<T>) {
    let (tx, rx) = mpsc::channel(1);
    (RendezvousSender { inner: tx }, RendezvousReceiver { inner: rx })
}

pub struct RendezvousSender<T> {
    inner: mpsc::Sender<(T, oneshot::Sender<()>)>,
}

impl<T> Clone for RendezvousSender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> RendezvousSender<T> {
    /// Waits until the receiver has taken `value`.
    pub async fn send(&self, value: T) -> Result<(), Disconnected> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.inner
            .send((value, ack_tx))
            .await
            .map_err(|_| Disconnected)?;
        ack_rx.await.map_err(|_| Disconnected)
    }
}

pub struct RendezvousReceiver<T> {
    inner: mpsc::Receiver<(T, oneshot::Sender<()>)>,
}

impl<T> RendezvousReceiver<T> {
    /// `None` once every sender is gone. Cancel safe.
    pub async fn recv(&mut self) -> Option<T> {
        let (value, ack) = self.inner.recv().await?;
        // The sender may have given up waiting; the value is still delivered.
        let _ = ack.send(());
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn send_waits_for_the_receiver() {
        let (tx, mut rx) = rendezvous::<u32>();
        let pending = tokio::spawn(async move { tx.send(7).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        assert_eq!(rx.recv().await, Some(7));
        assert_eq!(pending.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn mutual_send_first_never_completes() {
        let (a_tx, mut a_rx) = rendezvous::<u8>();
        let (b_tx, mut b_rx) = rendezvous::<u8>();

        let left = async move {
            a_tx.send(1).await.unwrap();
            b_rx.recv().await
        };
        let right = async move {
            b_tx.send(2).await.unwrap();
            a_rx.recv().await
        };
        let both = async { tokio::join!(left, right) };
        assert!(timeout(Duration::from_millis(100), both).await.is_err());
    }

    #[tokio::test]
    async fn dropped_receiver_is_reported() {
        let (tx, rx) = rendezvous::<u8>();
        drop(rx);
        assert_eq!(tx.send(1).await, Err(Disconnected));
    }

    #[tokio::test]
    async fn recv_ends_when_senders_are_gone() {
        let (tx, mut rx) = rendezvous::<u8>();
        drop(tx);
        assert_eq!(rx.recv().await, None);
    }
}
