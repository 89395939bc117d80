//! Domain events and webhook registrations.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::asset::Asset;
use crate::id::{EventId, WebhookId, WorkspaceId};
use crate::operator::{Actor, Operator};

/// Stable event type names; webhooks select by exact match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    AssetCreate,
    AssetDecompress,
    AssetDelete,
    ItemCreate,
    ItemUpdate,
    ItemDelete,
    ItemPublish,
    ItemUnpublish,
    Custom(String),
}

impl EventType {
    pub fn custom(name: impl Into<String>) -> Self {
        EventType::Custom(name.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventType::AssetCreate => "asset.create",
            EventType::AssetDecompress => "asset.decompress",
            EventType::AssetDelete => "asset.delete",
            EventType::ItemCreate => "item.create",
            EventType::ItemUpdate => "item.update",
            EventType::ItemDelete => "item.delete",
            EventType::ItemPublish => "item.publish",
            EventType::ItemUnpublish => "item.unpublish",
            EventType::Custom(name) => name,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "asset.create" => EventType::AssetCreate,
            "asset.decompress" => EventType::AssetDecompress,
            "asset.delete" => EventType::AssetDelete,
            "item.create" => EventType::ItemCreate,
            "item.update" => EventType::ItemUpdate,
            "item.delete" => EventType::ItemDelete,
            "item.publish" => EventType::ItemPublish,
            "item.unpublish" => EventType::ItemUnpublish,
            other => EventType::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(EventType::parse(&raw))
    }
}

/// Payload an event refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum EventObject {
    Asset(Box<Asset>),
    /// Objects owned by collaborators (items, schemas), kept opaque here.
    Composite(serde_json::Value),
}

/// Immutable event log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub workspace: WorkspaceId,
    pub operator: Actor,
    pub object: EventObject,
}

impl Event {
    pub fn new(event_type: EventType, workspace: WorkspaceId, operator: Actor, object: EventObject) -> Self {
        let id = EventId::new();
        Self {
            timestamp: id.timestamp(),
            id,
            event_type,
            workspace,
            operator,
            object,
        }
    }

    pub fn for_asset(event_type: EventType, operator: &Operator, asset: &Asset) -> Self {
        Self::new(
            event_type,
            asset.workspace(),
            operator.actor,
            EventObject::Asset(Box::new(asset.clone())),
        )
    }

    pub fn asset(&self) -> Option<&Asset> {
        match &self.object {
            EventObject::Asset(a) => Some(a),
            EventObject::Composite(_) => None,
        }
    }
}

/// Outgoing webhook registered on a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webhook {
    pub id: WebhookId,
    pub workspace: WorkspaceId,
    pub name: String,
    pub url: String,
    pub active: bool,
    pub triggers: Vec<EventType>,
    #[serde(default, skip_serializing)]
    pub secret: String,
    pub created_at: DateTime<Utc>,
}

impl Webhook {
    pub fn new(workspace: WorkspaceId, name: impl Into<String>, url: impl Into<String>, secret: impl Into<String>) -> Self {
        let id = WebhookId::new();
        Self {
            created_at: id.timestamp(),
            id,
            workspace,
            name: name.into(),
            url: url.into(),
            active: true,
            triggers: Vec::new(),
            secret: secret.into(),
        }
    }

    pub fn with_trigger(mut self, trigger: EventType) -> Self {
        if !self.triggers.contains(&trigger) {
            self.triggers.push(trigger);
        }
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Active and subscribed to `event_type`.
    pub fn wants(&self, event_type: &EventType) -> bool {
        self.active && self.triggers.iter().any(|t| t == event_type)
    }
}
