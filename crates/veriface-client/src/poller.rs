//! Background health polling as an explicitly started, explicitly stopped
//! task. Nothing starts polling implicitly; owners decide the lifecycle.

use crate::client::RecognitionClient;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Periodic health checker for a [`RecognitionClient`].
pub struct HealthPoller {
    shutdown: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl HealthPoller {
    /// Check `client` immediately, then every `interval`, until [`stop`]
    /// is called.
    ///
    /// [`stop`]: HealthPoller::stop
    pub fn start(client: RecognitionClient, interval: Duration) -> Self {
        let (shutdown, mut rx) = broadcast::channel(1);
        let handle = tokio::spawn(async move {
            tracing::debug!(interval_ms = interval.as_millis() as u64, "health poller started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => client.check_health().await,
                    _ = rx.recv() => break,
                }
            }
            tracing::debug!("health poller stopped");
        });
        Self { shutdown, handle }
    }

    /// Signal the loop to exit and wait for it to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }
}
