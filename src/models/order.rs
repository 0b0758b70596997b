use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::tracking::TrackingMirror;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Lifecycle of a purchase order. The main path runs left to right;
/// `Cancelled`, `Expired` and `Disputed` are reachable from every
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    PendingBroadcast,
    Broadcasted,
    Accepted,
    Confirmed,
    InPreparation,
    Assigned,
    InDelivery,
    Delivered,
    Completed,
    Cancelled,
    Expired,
    Disputed,
}

/// Coarse phase of an order, the single authoritative mapping used by
/// read-model queries. Status strings are never compared ad hoc elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPhase {
    Search,
    Tracking,
    Finished,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::PendingBroadcast => "pending_broadcast",
            OrderStatus::Broadcasted => "broadcasted",
            OrderStatus::Accepted => "accepted",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::InPreparation => "in_preparation",
            OrderStatus::Assigned => "assigned",
            OrderStatus::InDelivery => "in_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Expired => "expired",
            OrderStatus::Disputed => "disputed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Completed
                | OrderStatus::Cancelled
                | OrderStatus::Expired
                | OrderStatus::Disputed
        )
    }

    /// The fixed adjacency table. Everything not listed here is rejected
    /// with a conflict, which is what serializes racing writers.
    pub fn can_transition_to(self, target: OrderStatus) -> bool {
        use OrderStatus::*;

        if self.is_terminal() {
            return false;
        }

        if matches!(target, Cancelled | Expired | Disputed) {
            return true;
        }

        matches!(
            (self, target),
            (Created, PendingBroadcast)
                | (PendingBroadcast, Broadcasted)
                | (Broadcasted, Accepted)
                | (Broadcasted, Confirmed)
                | (Accepted, Confirmed)
                | (Confirmed, InPreparation)
                | (InPreparation, Assigned)
                // courier rejected the leg, provider re-assigns
                | (Assigned, InPreparation)
                | (Assigned, InDelivery)
                | (InDelivery, Delivered)
                | (Delivered, Completed)
        )
    }

    pub fn phase(self) -> OrderPhase {
        use OrderStatus::*;

        match self {
            Created | PendingBroadcast | Broadcasted | Accepted => OrderPhase::Search,
            Confirmed | InPreparation | Assigned | InDelivery => OrderPhase::Tracking,
            Delivered | Completed | Cancelled | Expired | Disputed => OrderPhase::Finished,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub client_id: Uuid,
    pub provider_id: Option<Uuid>,
    pub courier_id: Option<Uuid>,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub service_fee: f64,
    pub delivery_fee: f64,
    pub total_amount: f64,
    pub status: OrderStatus,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn delivery_location(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }
}

/// Structured payload attached to a status event. Closed shape: every
/// field the system ever records is declared here, nothing is free-form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_fee: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub courier_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired_after_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking: Option<TrackingMirror>,
}

/// Append-only audit record, one per accepted transition. The system of
/// record for order history; replayed oldest-first to reconstruct it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusEvent {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub note: Option<String>,
    pub metadata: Option<EventMetadata>,
    pub created_at: DateTime<Utc>,
}

/// A provider's non-binding vote of interest in a broadcasted order.
/// Unique per (order, provider); never mutated once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAccept {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub location_address: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::{OrderPhase, OrderStatus};

    #[test]
    fn main_path_is_legal_end_to_end() {
        use OrderStatus::*;
        let path = [
            Created,
            PendingBroadcast,
            Broadcasted,
            Accepted,
            Confirmed,
            InPreparation,
            Assigned,
            InDelivery,
            Delivered,
            Completed,
        ];

        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be legal",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn terminal_states_accept_nothing() {
        use OrderStatus::*;
        for terminal in [Completed, Cancelled, Expired, Disputed] {
            for target in [Created, Broadcasted, Confirmed, Cancelled, Completed] {
                assert!(!terminal.can_transition_to(target));
            }
        }
    }

    #[test]
    fn side_branches_reachable_from_any_non_terminal() {
        use OrderStatus::*;
        for current in [Created, Broadcasted, Confirmed, InDelivery, Delivered] {
            assert!(current.can_transition_to(Cancelled));
            assert!(current.can_transition_to(Expired));
            assert!(current.can_transition_to(Disputed));
        }
    }

    #[test]
    fn skipping_ahead_is_rejected() {
        use OrderStatus::*;
        assert!(!Created.can_transition_to(Broadcasted));
        assert!(!Broadcasted.can_transition_to(InPreparation));
        assert!(!Confirmed.can_transition_to(Delivered));
        assert!(!InPreparation.can_transition_to(InDelivery));
    }

    #[test]
    fn confirm_allowed_with_or_without_stopping_search() {
        use OrderStatus::*;
        assert!(Broadcasted.can_transition_to(Confirmed));
        assert!(Accepted.can_transition_to(Confirmed));
    }

    #[test]
    fn phase_mapping_matches_lifecycle() {
        use OrderStatus::*;
        assert_eq!(Broadcasted.phase(), OrderPhase::Search);
        assert_eq!(Accepted.phase(), OrderPhase::Search);
        assert_eq!(Confirmed.phase(), OrderPhase::Tracking);
        assert_eq!(InDelivery.phase(), OrderPhase::Tracking);
        assert_eq!(Delivered.phase(), OrderPhase::Finished);
        assert_eq!(Expired.phase(), OrderPhase::Finished);
    }
}
