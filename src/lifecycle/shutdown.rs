//! Graceful stop of the server and its background tasks.

use tokio::sync::broadcast;

/// One-shot stop signal fanned out to the HTTP server and the config
/// update task.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Wake every subscriber. Subscribers created afterwards miss the signal.
    pub fn trigger(&self) {
        if self.tx.send(()).is_err() {
            tracing::debug!("Shutdown triggered with no subscribers");
        }
    }

    /// Resolve when the signal fires.
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        // a closed channel counts as shutdown
        let _ = rx.recv().await;
    }

    /// Tasks still listening for the signal.
    pub fn listeners(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
