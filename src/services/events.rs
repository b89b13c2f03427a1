//! Domain event publication.
//!
//! Publishing is fire-and-forget: a broker outage must never fail a checkout,
//! so errors are logged and dropped.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::events::DomainEvent;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: DomainEvent);
}

/// Publishes events as JSON on their NATS subject.
pub struct NatsPublisher {
    client: async_nats::Client,
}

impl NatsPublisher {
    pub async fn connect(url: &str) -> Result<Self, async_nats::ConnectError> {
        let client = async_nats::connect(url).await?;
        Ok(Self { client })
    }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, event: DomainEvent) {
        let subject = event.subject();
        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(subject, error = %e, "failed to encode event");
                return;
            }
        };
        if let Err(e) = self.client.publish(subject.to_string(), payload.into()).await {
            tracing::warn!(subject, error = %e, "failed to publish event");
        }
    }
}

/// Used when no broker is configured.
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, event: DomainEvent) {
        tracing::debug!(subject = event.subject(), "event dropped, no broker configured");
    }
}

/// Keeps every event in memory; handy for asserting on side effects.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn subjects(&self) -> Vec<&'static str> {
        self.events().iter().map(DomainEvent::subject).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: DomainEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
