use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a single delivery leg. `Rejected` is reachable only from
/// `Pending`, `Failed` only from `InTransit`; terminal rows are read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    Pending,
    Rejected,
    Assigned,
    Retrieved,
    InTransit,
    AtDestination,
    Delivered,
    Failed,
}

impl TrackingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TrackingStatus::Pending => "pending",
            TrackingStatus::Rejected => "rejected",
            TrackingStatus::Assigned => "assigned",
            TrackingStatus::Retrieved => "retrieved",
            TrackingStatus::InTransit => "in_transit",
            TrackingStatus::AtDestination => "at_destination",
            TrackingStatus::Delivered => "delivered",
            TrackingStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TrackingStatus::Rejected | TrackingStatus::Delivered | TrackingStatus::Failed
        )
    }

    pub fn can_transition_to(self, target: TrackingStatus) -> bool {
        use TrackingStatus::*;

        matches!(
            (self, target),
            (Pending, Assigned)
                | (Pending, Rejected)
                | (Assigned, Retrieved)
                | (Retrieved, InTransit)
                | (InTransit, AtDestination)
                | (InTransit, Failed)
                | (AtDestination, Delivered)
        )
    }
}

impl std::fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attempt to deliver a confirmed order. At most one non-terminal row
/// exists per order; a rejected row is superseded by a fresh one, never
/// resurrected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryTracking {
    pub id: Uuid,
    pub order_id: Uuid,
    /// None while the leg is offered to an unregistered phone-only contact.
    pub assigned_to: Option<Uuid>,
    pub phone: String,
    pub distance_km: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_address: Option<String>,
    pub status: TrackingStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub proof_url: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Snapshot of a tracking transition embedded into the correlated order
/// status event when the leg mirrors onto the order lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingMirror {
    pub tracking_id: Uuid,
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
