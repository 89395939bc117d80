use std::sync::Arc;
use std::time::Duration;

use cms_core::{Actor, Event, EventObject, EventType, Webhook, WorkspaceId};
use cms_events::{verify, DeliveryError, EventBus, RecordingSender, RetryPolicy, WebhookPayload};
use cms_store::{
    EventRepository, MemoryDatabase, MemoryEventRepository, MemoryWebhookRepository,
    WebhookRepository,
};
use serde_json::json;

struct Harness {
    bus: EventBus,
    sender: RecordingSender,
    events: MemoryEventRepository,
    webhooks: MemoryWebhookRepository,
}

fn harness(max_attempts: u32) -> Harness {
    let db = MemoryDatabase::new();
    let events = MemoryEventRepository::new(db.clone());
    let webhooks = MemoryWebhookRepository::new(db);
    let sender = RecordingSender::new();
    let bus = EventBus::new(
        Arc::new(events.clone()),
        Arc::new(webhooks.clone()),
        Arc::new(sender.clone()),
    )
    .with_policy(RetryPolicy {
        max_attempts,
        base_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
    });

    Harness {
        bus,
        sender,
        events,
        webhooks,
    }
}

fn asset_created(workspace: WorkspaceId) -> Event {
    Event::new(
        EventType::AssetCreate,
        workspace,
        Actor::Machine,
        EventObject::Composite(json!({"name": "bundle.zip"})),
    )
}

/// A1. Saved Events Are Idempotent By Id
#[tokio::test]
async fn test_save_is_idempotent() {
    let h = harness(1);
    let event = asset_created(WorkspaceId::new());

    // Act
    h.bus.save(&event).await.unwrap();
    h.bus.save(&event).await.unwrap();

    // Assert
    assert_eq!(h.events.list().await.unwrap(), vec![event.clone()]);
    assert_eq!(h.events.find_by_id(event.id).await.unwrap(), event);
}

/// B1. Only Active, Subscribed Webhooks Of The Workspace Receive The Event
#[tokio::test]
async fn test_publish_selects_webhooks() {
    let h = harness(1);
    let ws = WorkspaceId::new();

    // Arrange
    let wanted = Webhook::new(ws, "wanted", "https://a.test/hook", "s1").with_trigger(EventType::AssetCreate);
    let other_type = Webhook::new(ws, "other", "https://b.test/hook", "s2").with_trigger(EventType::AssetDelete);
    let inactive = Webhook::new(ws, "off", "https://c.test/hook", "s3")
        .with_trigger(EventType::AssetCreate)
        .with_active(false);
    let other_ws = Webhook::new(WorkspaceId::new(), "elsewhere", "https://d.test/hook", "s4")
        .with_trigger(EventType::AssetCreate);
    for hook in [&wanted, &other_type, &inactive, &other_ws] {
        h.webhooks.save(hook).await.unwrap();
    }

    // Act
    let event = asset_created(ws);
    let reports = futures_join(h.bus.publish(&event).await.unwrap()).await;

    // Assert
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].webhook, wanted.id);
    assert!(reports[0].delivered());
    assert_eq!(h.sender.attempts_for(wanted.id), 1);
    assert_eq!(h.sender.attempts().len(), 1);
}

/// B2. Delivery Body And Signature
#[tokio::test]
async fn test_delivery_is_signed() {
    let h = harness(1);
    let ws = WorkspaceId::new();
    let hook = Webhook::new(ws, "h", "https://a.test/hook", "s3cret").with_trigger(EventType::AssetCreate);
    h.webhooks.save(&hook).await.unwrap();

    // Act
    let event = asset_created(ws);
    futures_join(h.bus.publish(&event).await.unwrap()).await;

    // Assert
    let (_, delivery) = h.sender.attempts().pop().unwrap();
    assert!(verify("s3cret", &delivery.signature, &delivery.body));
    assert!(!verify("wrong", &delivery.signature, &delivery.body));

    let body = delivery.body_json().unwrap();
    assert_eq!(body["id"], event.id.to_string());
    assert_eq!(body["type"], "asset.create");
    assert_eq!(body["operator"]["type"], "machine");
    assert_eq!(body["data"]["name"], "bundle.zip");
    let payload: WebhookPayload = serde_json::from_value(body).unwrap();
    assert_eq!(payload.event_type, EventType::AssetCreate);
}

/// C1. Failed Deliveries Retry With Backoff
#[tokio::test]
async fn test_failed_delivery_retries() {
    let h = harness(5);
    let ws = WorkspaceId::new();
    let hook = Webhook::new(ws, "h", "https://a.test/hook", "s").with_trigger(EventType::AssetCreate);
    h.webhooks.save(&hook).await.unwrap();
    h.sender.fail_times(hook.id, 2);

    // Act
    let reports = futures_join(h.bus.publish(&asset_created(ws)).await.unwrap()).await;

    // Assert
    assert!(reports[0].delivered());
    assert_eq!(reports[0].attempts, 3);
    assert_eq!(h.sender.attempts_for(hook.id), 3);
}

/// C2. Exhausted Retries Are Reported, Not Raised
#[tokio::test]
async fn test_exhausted_retries() {
    let h = harness(3);
    let ws = WorkspaceId::new();
    let hook = Webhook::new(ws, "h", "https://a.test/hook", "s").with_trigger(EventType::AssetCreate);
    h.webhooks.save(&hook).await.unwrap();
    h.sender.fail_always(hook.id);

    // Act: publish itself succeeds
    let handles = h.bus.publish(&asset_created(ws)).await.unwrap();
    let reports = futures_join(handles).await;

    // Assert
    assert_eq!(reports[0].attempts, 3);
    assert_eq!(reports[0].result, Err(DeliveryError::Status(503)));
    assert_eq!(h.sender.attempts_for(hook.id), 3);
}

/// D1. No Subscribers Means No Work
#[tokio::test]
async fn test_publish_without_webhooks() {
    let h = harness(1);
    let handles = h.bus.publish(&asset_created(WorkspaceId::new())).await.unwrap();
    assert!(handles.is_empty());
    assert!(h.sender.attempts().is_empty());
}

async fn futures_join(
    handles: Vec<tokio::task::JoinHandle<cms_events::DeliveryReport>>,
) -> Vec<cms_events::DeliveryReport> {
    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        reports.push(handle.await.expect("delivery task panicked"));
    }
    reports
}
