//! Per-asset progress publishing.
//!
//! One bounded broadcast channel per asset id, created when the first observer
//! subscribes. Delivery is at-most-once: events published while nobody is
//! subscribed are dropped, and a subscriber that falls behind by more than the
//! channel capacity skips ahead. The last event of a run closes the channel so
//! subscriber streams end.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::{broadcast, watch};
use vidstream_core::models::{ProgressEvent, ProgressStage};
use vidstream_core::VideoId;

pub struct ProgressBroadcaster {
    channels: Mutex<HashMap<VideoId, broadcast::Sender<ProgressEvent>>>,
    capacity: usize,
}

impl ProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to an asset's events. Channels whose subscribers have all gone
    /// away are pruned first.
    pub fn subscribe(&self, video_id: &VideoId) -> broadcast::Receiver<ProgressEvent> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels.retain(|_, sender| sender.receiver_count() > 0);
        channels
            .entry(video_id.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Give up a subscription that will not be read.
    pub fn unsubscribe(&self, video_id: &VideoId, receiver: broadcast::Receiver<ProgressEvent>) {
        drop(receiver);
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        if channels
            .get(video_id)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            channels.remove(video_id);
        }
    }

    /// Number of assets with an open channel.
    pub fn channel_count(&self) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Publish to current subscribers. Returns how many received the event.
    pub fn publish(&self, event: ProgressEvent) -> usize {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(sender) = channels.get(&event.video_id) else {
            tracing::trace!(video_id = %event.video_id, "No subscribers, progress event dropped");
            return 0;
        };

        let terminal = event.is_terminal();
        let video_id = event.video_id.clone();
        let delivered = match sender.send(event) {
            Ok(count) => count,
            Err(_) => {
                channels.remove(&video_id);
                return 0;
            }
        };

        if terminal {
            channels.remove(&video_id);
        }

        delivered
    }

    pub fn subscriber_count(&self, video_id: &VideoId) -> usize {
        let channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels
            .get(video_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    pub fn handle(self: &Arc<Self>, video_id: VideoId) -> ProgressHandle {
        ProgressHandle {
            broadcaster: Arc::clone(self),
            video_id,
            percent_mirror: None,
        }
    }
}

/// Publishing façade bound to one asset.
#[derive(Clone)]
pub struct ProgressHandle {
    broadcaster: Arc<ProgressBroadcaster>,
    video_id: VideoId,
    percent_mirror: Option<Arc<watch::Sender<u8>>>,
}

impl ProgressHandle {
    /// Also forward every percent update to `mirror`, regardless of subscribers.
    pub fn with_percent_mirror(mut self, mirror: watch::Sender<u8>) -> Self {
        self.percent_mirror = Some(Arc::new(mirror));
        self
    }

    pub fn video_id(&self) -> &VideoId {
        &self.video_id
    }

    pub fn started(&self, stage: ProgressStage) {
        self.broadcaster
            .publish(ProgressEvent::started(self.video_id.clone(), stage));
    }

    pub fn percent(&self, stage: ProgressStage, percent: u8) {
        if let Some(mirror) = &self.percent_mirror {
            mirror.send_replace(percent);
        }
        self.broadcaster
            .publish(ProgressEvent::percent(self.video_id.clone(), stage, percent));
    }

    pub fn payload(&self, stage: ProgressStage, payload: Value) {
        self.broadcaster
            .publish(ProgressEvent::payload(self.video_id.clone(), stage, payload));
    }

    pub fn completed(&self, stage: ProgressStage, payload: Option<Value>) {
        self.broadcaster
            .publish(ProgressEvent::completed(self.video_id.clone(), stage, payload));
    }

    pub fn failed(&self, stage: ProgressStage, error: impl Into<String>) {
        self.broadcaster
            .publish(ProgressEvent::error(self.video_id.clone(), stage, error));
    }
}
