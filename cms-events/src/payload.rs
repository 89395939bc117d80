use chrono::{DateTime, Utc};
use cms_core::{Actor, Event, EventId, EventObject, EventType};
use serde::{Deserialize, Serialize};

/// Body POSTed to a webhook endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub id: EventId,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub operator: Actor,
    pub data: serde_json::Value,
}

impl WebhookPayload {
    pub fn from_event(event: &Event) -> serde_json::Result<Self> {
        let data = match &event.object {
            EventObject::Asset(asset) => serde_json::to_value(asset)?,
            EventObject::Composite(value) => value.clone(),
        };

        Ok(Self {
            id: event.id,
            event_type: event.event_type.clone(),
            timestamp: event.timestamp,
            operator: event.operator,
            data,
        })
    }
}

/// A signed, ready-to-send request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub event_id: EventId,
    pub body: Vec<u8>,
    pub timestamp: i64,
    pub signature: String,
}

impl Delivery {
    pub fn body_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.body)
    }
}
