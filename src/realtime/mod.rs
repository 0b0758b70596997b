use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::order::{EventMetadata, Order, OrderStatus};
use crate::models::tracking::TrackingStatus;

/// Where an event is addressed. Subscribers watch a single topic; the
/// order-wide topic and the per-leg topic are deliberately distinct so a
/// courier can follow their leg without seeing the whole order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topic {
    Order(Uuid),
    Tracking(Uuid),
    User(Uuid),
    OrdersFeed,
}

impl Topic {
    pub fn name(&self) -> String {
        match self {
            Topic::Order(id) => format!("order_{id}"),
            Topic::Tracking(id) => format!("tracking_{id}"),
            Topic::User(id) => format!("user_{id}"),
            Topic::OrdersFeed => "orders_feed".to_string(),
        }
    }
}

/// Closed set of realtime events: one variant per (topic-kind, event-name)
/// pair, each with a fixed payload shape. Nothing loosely-typed crosses
/// the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RealtimeEvent {
    /// `status_update` on `order_{id}`.
    OrderStatus(OrderStatusUpdate),
    /// `location_update` on `order_{id}`.
    OrderLocation(OrderLocationUpdate),
    /// `status_update` on `tracking_{id}`.
    TrackingStatus(TrackingStatusUpdate),
    /// `delivery_request` on `user_{id}`.
    DeliveryRequest(DeliveryRequest),
    /// `new_order` on `orders_feed`.
    NewOrder(OrderFeedEntry),
}

impl RealtimeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RealtimeEvent::OrderStatus(_) => "status_update",
            RealtimeEvent::OrderLocation(_) => "location_update",
            RealtimeEvent::TrackingStatus(_) => "status_update",
            RealtimeEvent::DeliveryRequest(_) => "delivery_request",
            RealtimeEvent::NewOrder(_) => "new_order",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderStatusUpdate {
    pub order_id: Uuid,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMetadata>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderLocationUpdate {
    pub order_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackingStatusUpdate {
    pub tracking_id: Uuid,
    pub order_id: Uuid,
    pub previous_status: TrackingStatus,
    pub new_status: TrackingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryRequest {
    pub order_id: Uuid,
    pub tracking_id: Uuid,
    pub note: String,
}

/// Order summary published on the provider-side discovery feed.
#[derive(Debug, Clone, Serialize)]
pub struct OrderFeedEntry {
    pub id: Uuid,
    pub client_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: u32,
    pub service_fee: f64,
    pub delivery_fee: f64,
    pub total_amount: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: OrderStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Order> for OrderFeedEntry {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            client_id: order.client_id,
            product_id: order.product_id,
            product_name: order.product_name.clone(),
            quantity: order.quantity,
            service_fee: order.service_fee,
            delivery_fee: order.delivery_fee,
            total_amount: order.total_amount,
            latitude: order.latitude,
            longitude: order.longitude,
            status: order.status,
            created_at: order.created_at,
        }
    }
}

/// What subscribers receive, ready for the wire.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub topic: String,
    pub event: &'static str,
    pub payload: serde_json::Value,
}

/// Fan-out over a broadcast channel. Publishing is fire-and-forget:
/// delivery is at-least-once per connected subscriber and a publish with
/// no subscribers is not an error. Consumers must tolerate duplicates
/// and discard stale location updates themselves.
#[derive(Clone)]
pub struct RealtimePublisher {
    tx: broadcast::Sender<Envelope>,
}

impl RealtimePublisher {
    pub fn new(buffer: usize) -> Self {
        let (tx, _unused_rx) = broadcast::channel(buffer);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    pub fn publish(&self, topic: Topic, event: RealtimeEvent) {
        let name = event.name();
        let payload = match serde_json::to_value(&event) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = %err, event = name, "failed to serialize realtime event");
                return;
            }
        };

        let envelope = Envelope {
            topic: topic.name(),
            event: name,
            payload,
        };

        // Err means no live subscribers, which is fine.
        let _ = self.tx.send(envelope);
    }
}
