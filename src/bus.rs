//! Typed event bus connecting the coordinators.
//!
//! Fan-out uses `tokio::sync::broadcast` with bounded per-subscriber
//! buffers. A subscriber that falls behind its buffer is disconnected
//! rather than allowed to grow unbounded; publishing never fails the
//! caller (partial-failure semantics).

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::types::{
    AmbushAlert, DispatchRequest, FailoverEvent, FusedEvent, PredictiveAlert, ProximityWarning,
    RawEvent, TriggerEvent,
};

/// Default per-subscriber buffer depth.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// Messages carried on the system bus.
#[derive(Debug, Clone)]
pub enum BusEvent {
    RawAccepted(RawEvent),
    FusionCreated(FusedEvent),
    FusionUpdated(FusedEvent),
    DispatchTriggered(TriggerEvent),
    DispatchDecided(DispatchRequest),
    SafetyWarning { officer_id: String, warning: ProximityWarning },
    AmbushAlert(AmbushAlert),
    Failover(FailoverEvent),
    Predictive(PredictiveAlert),
    OperatorNotification { channel: String, message: String },
}

/// Bounded broadcast bus shared by the engines.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish to all current subscribers.
    ///
    /// Returns the number of subscribers that will observe the event.
    /// Zero subscribers is not an error; lagged subscribers see
    /// `RecvError::Lagged` on their side and are dropped by
    /// [`BusSubscriber::recv`].
    pub fn publish(&self, event: BusEvent) -> usize {
        match self.tx.send(event) {
            Ok(n) => n,
            Err(_) => {
                debug!("bus publish with no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self, name: &str) -> BusSubscriber {
        BusSubscriber {
            name: name.to_string(),
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

/// A named subscription with lag-based disconnect.
pub struct BusSubscriber {
    name: String,
    rx: broadcast::Receiver<BusEvent>,
}

impl BusSubscriber {
    /// Receive the next event.
    ///
    /// Returns `None` when the subscriber has lagged past its buffer
    /// (it is disconnected, per policy) or the bus is closed.
    pub async fn recv(&mut self) -> Option<BusEvent> {
        match self.rx.recv().await {
            Ok(ev) => Some(ev),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(
                    subscriber = %self.name,
                    skipped,
                    "bus subscriber lagged past its buffer - disconnecting"
                );
                None
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventPayload, EventSource, GeoPoint};
    use chrono::Utc;

    fn raw(id: &str) -> RawEvent {
        RawEvent {
            event_id: id.to_string(),
            source: EventSource::Gunshot,
            event_time: Utc::now(),
            ingest_time: Utc::now(),
            location: Some(GeoPoint::new(26.7, -80.05)),
            payload: EventPayload::GunshotDetection {
                rounds_detected: 3,
                confidence: 0.9,
                sensor_array: None,
            },
            confidence: 0.9,
            correlation_hints: vec![],
        }
    }

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = EventBus::new(8);
        let mut sub = bus.subscribe("test");
        bus.publish(BusEvent::RawAccepted(raw("e1")));
        match sub.recv().await {
            Some(BusEvent::RawAccepted(ev)) => assert_eq!(ev.event_id, "e1"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn lagged_subscriber_disconnects() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe("slow");
        for i in 0..10 {
            bus.publish(BusEvent::OperatorNotification {
                channel: "ops".into(),
                message: format!("m{i}"),
            });
        }
        // First recv observes the lag and disconnects.
        assert!(sub.recv().await.is_none());
    }
}
