//! Ctrl+C shutdown handling
//!
//! A broadcast channel carries the shutdown signal so every task can hold
//! its own receiver.

use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Shutdown signal type (unit type, just signals "shutdown now")
pub type ShutdownSignal = ();

/// Shutdown channel sender
pub type ShutdownSender = broadcast::Sender<ShutdownSignal>;

/// Shutdown channel receiver
pub type ShutdownReceiver = broadcast::Receiver<ShutdownSignal>;

/// Create a shutdown channel without any signal hook
pub fn shutdown_channel() -> (ShutdownSender, ShutdownReceiver) {
    broadcast::channel::<ShutdownSignal>(1)
}

/// Setup shutdown handling with Ctrl+C signal
///
/// Spawns a task that sends on Ctrl+C. The sender is returned so callers
/// can trigger shutdown for other reasons too.
///
/// # Example
/// ```ignore
/// let (_shutdown_tx, shutdown_rx) = setup_shutdown();
/// session.run(shutdown_rx).await?;
/// ```
pub fn setup_shutdown() -> (ShutdownSender, ShutdownReceiver) {
    let (tx, rx) = shutdown_channel();

    let tx_clone = tx.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl+C received, initiating shutdown");
                let _ = tx_clone.send(());
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
        }
    });

    (tx, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_channel() {
        let (tx, mut rx) = shutdown_channel();
        tx.send(()).unwrap();
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_resubscribe_sees_later_signal() {
        let (tx, rx) = shutdown_channel();
        let mut second = rx.resubscribe();
        tx.send(()).unwrap();
        assert!(second.recv().await.is_ok());
    }

    #[test]
    fn test_type_aliases() {
        fn _takes_sender(_: ShutdownSender) {}
        fn _takes_receiver(_: ShutdownReceiver) {}
    }
}
