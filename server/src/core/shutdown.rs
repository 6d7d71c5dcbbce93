//! Centralized shutdown management

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use super::constants::SHUTDOWN_TIMEOUT_SECS;

/// Coordinates graceful shutdown across background tasks.
///
/// Long-lived tasks (firehose consumer, sweepers, subscriber writers'
/// parents) subscribe to the signal and register their handles; `shutdown`
/// flips the signal and waits for everything registered, bounded by a
/// deadline.
#[derive(Clone)]
pub struct ShutdownService {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Default for ShutdownService {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownService {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
            handles: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register a background task handle to be awaited during shutdown.
    pub async fn register(&self, handle: JoinHandle<()>) {
        self.handles.lock().await.push(handle);
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }

    /// Trigger shutdown without waiting.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Trigger shutdown and wait for all registered tasks, bounded by the
    /// shutdown deadline.
    pub async fn shutdown(&self) {
        tracing::debug!("initiating graceful shutdown");
        self.trigger();

        let handles = std::mem::take(&mut *self.handles.lock().await);
        let deadline = Duration::from_secs(SHUTDOWN_TIMEOUT_SECS);
        let drain = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(deadline, drain).await.is_err() {
            tracing::warn!(
                timeout_secs = SHUTDOWN_TIMEOUT_SECS,
                "background tasks did not drain before deadline"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_waits_for_registered_tasks() {
        let service = ShutdownService::new();
        let mut rx = service.subscribe();
        let flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let task_flag = flag.clone();
        service
            .register(tokio::spawn(async move {
                let _ = rx.changed().await;
                task_flag.store(true, std::sync::atomic::Ordering::SeqCst);
            }))
            .await;

        service.shutdown().await;
        assert!(flag.load(std::sync::atomic::Ordering::SeqCst));
        assert!(service.is_triggered());
    }
}
