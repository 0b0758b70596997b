use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::engine::lifecycle::{self, apply_order_status, TransitionRequest};
use crate::error::AppError;
use crate::models::order::{EventMetadata, GeoPoint, OrderStatus};
use crate::models::tracking::{DeliveryTracking, TrackingMirror, TrackingStatus};
use crate::realtime::{RealtimeEvent, Topic, TrackingStatusUpdate};
use crate::state::AppState;

#[derive(Debug, Clone, Default)]
pub struct TrackingUpdate {
    pub note: Option<String>,
    pub location: Option<GeoPoint>,
    pub proof_url: Option<String>,
}

/// Transition one delivery leg. Terminal rows are excluded from load
/// eligibility, which is what makes them read-only. The subset
/// `in_transit` / `delivered` / `failed` is mirrored onto the parent
/// order with the leg snapshot embedded in the correlated event.
pub fn apply_delivery_status(
    state: &AppState,
    tracking_id: Uuid,
    target: TrackingStatus,
    update: TrackingUpdate,
) -> Result<DeliveryTracking, AppError> {
    let mut previous_status = TrackingStatus::Pending;

    let tracking = state.store.update_tracking(tracking_id, |row| {
        if row.status.is_terminal() {
            // Same visibility rule as the read path: a finished leg no
            // longer exists for writers.
            return Err(AppError::NotFound(format!(
                "tracking {tracking_id} not found"
            )));
        }
        if !row.status.can_transition_to(target) {
            return Err(AppError::Conflict(format!(
                "cannot move delivery from {} to {}",
                row.status, target
            )));
        }

        previous_status = row.status;
        row.status = target;

        if let Some(location) = &update.location {
            row.latitude = Some(location.latitude);
            row.longitude = Some(location.longitude);
        }
        if let Some(note) = &update.note {
            row.note = Some(note.clone());
        }
        if let Some(proof_url) = &update.proof_url {
            row.proof_url = Some(proof_url.clone());
        }
        if target.is_terminal() {
            row.end_time = Some(Utc::now());
        }

        Ok(())
    })?;

    state
        .metrics
        .tracking_transitions_total
        .with_label_values(&[target.as_str()])
        .inc();

    let mirror = TrackingMirror {
        tracking_id,
        previous_status,
        new_status: target,
        latitude: update.location.as_ref().map(|l| l.latitude),
        longitude: update.location.as_ref().map(|l| l.longitude),
        note: update.note.clone(),
        proof_url: update.proof_url.clone(),
    };

    mirror_onto_order(state, &tracking, &mirror);
    publish_tracking_status(state, &tracking, &mirror);

    info!(
        tracking_id = %tracking_id,
        order_id = %tracking.order_id,
        from = %previous_status,
        to = %target,
        "delivery status updated"
    );

    Ok(tracking)
}

/// A leg transition that changes what the client should be told about
/// the order is replayed onto the order lifecycle with the tracking
/// snapshot attached. The leg write has already committed when this
/// runs; a mirror conflict (say the client cancelled concurrently) is
/// logged, not propagated.
fn mirror_onto_order(state: &AppState, tracking: &DeliveryTracking, mirror: &TrackingMirror) {
    let (order_status, note) = match mirror.new_status {
        TrackingStatus::InTransit => (OrderStatus::InDelivery, "order out for delivery"),
        TrackingStatus::Delivered => (OrderStatus::Delivered, "order delivered"),
        TrackingStatus::Failed => (OrderStatus::Cancelled, "delivery abandoned by the courier"),
        _ => return,
    };

    let metadata = EventMetadata {
        tracking: Some(mirror.clone()),
        ..Default::default()
    };

    if let Err(err) = apply_order_status(
        state,
        tracking.order_id,
        TransitionRequest::to(order_status)
            .with_note(note)
            .with_metadata(metadata),
    ) {
        tracing::warn!(
            order_id = %tracking.order_id,
            tracking_id = %tracking.id,
            error = %err,
            "delivery transition committed but order mirror was rejected"
        );
    }
}

fn publish_tracking_status(state: &AppState, tracking: &DeliveryTracking, mirror: &TrackingMirror) {
    state
        .metrics
        .realtime_events_total
        .with_label_values(&["status_update"])
        .inc();
    state.realtime.publish(
        Topic::Tracking(tracking.id),
        RealtimeEvent::TrackingStatus(TrackingStatusUpdate {
            tracking_id: tracking.id,
            order_id: tracking.order_id,
            previous_status: mirror.previous_status,
            new_status: mirror.new_status,
            latitude: mirror.latitude,
            longitude: mirror.longitude,
            note: mirror.note.clone(),
            proof_url: mirror.proof_url.clone(),
        }),
    );
}

/// Live courier position: written onto every active leg assigned to the
/// courier and fanned out on each parent order topic. Fire-and-forget,
/// no ordering guarantee; consumers drop stale points themselves.
pub fn update_courier_position(
    state: &AppState,
    courier_id: Uuid,
    location: GeoPoint,
) -> Result<usize, AppError> {
    let legs = state.store.trackings_by_courier(courier_id);
    let mut updated = 0;

    for leg in legs {
        if leg.status.is_terminal() {
            continue;
        }

        let written = state.store.update_tracking(leg.id, |row| {
            if row.status.is_terminal() {
                return Err(AppError::Conflict("delivery already finished".to_string()));
            }
            row.latitude = Some(location.latitude);
            row.longitude = Some(location.longitude);
            Ok(())
        });

        if written.is_ok() {
            lifecycle::publish_order_location(state, leg.order_id, location);
            updated += 1;
        }
    }

    Ok(updated)
}
