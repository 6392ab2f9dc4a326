//! Periodic cleanup of abandoned upload sessions.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use vidstream_processing::VideoPipeline;

pub fn spawn_session_reaper(pipeline: Arc<VideoPipeline>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let reaped = pipeline.reap_expired(Utc::now()).await;
            if !reaped.is_empty() {
                tracing::info!(count = reaped.len(), "Reaped expired upload sessions");
            }
        }
    })
}
