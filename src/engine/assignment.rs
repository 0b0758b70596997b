use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::lifecycle::{apply_order_status, TransitionRequest};
use crate::error::AppError;
use crate::geo::{format_eta, haversine_km};
use crate::models::order::{EventMetadata, GeoPoint, OrderStatus};
use crate::models::tracking::{DeliveryTracking, TrackingStatus};
use crate::notify::{is_valid_phone, normalize_phone};
use crate::realtime::{DeliveryRequest, RealtimeEvent, Topic};
use crate::state::AppState;

/// How the delivery leg was staffed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentScenario {
    /// The provider delivers their own order; no acceptance round.
    SelfDelivery,
    /// A registered courier was asked in-app (and by SMS) to accept.
    KnownCourier,
    /// The phone has no account yet; an SMS invitation binds it later.
    InvitedCourier,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentOutcome {
    pub scenario: AssignmentScenario,
    pub tracking: DeliveryTracking,
}

/// Resolve who performs the physical delivery of an `in_preparation`
/// order. Stale pending offers are superseded; an active leg makes the
/// call a conflict, so retries are harmless.
pub async fn assign_delivery(
    state: &AppState,
    order_id: Uuid,
    provider_id: Uuid,
    courier_phone: &str,
) -> Result<AssignmentOutcome, AppError> {
    let phone = normalize_phone(courier_phone);
    if !is_valid_phone(&phone) {
        return Err(AppError::Validation(
            "unsupported phone number format".to_string(),
        ));
    }

    let order = state.store.with_order(order_id, |order| {
        if order.status != OrderStatus::InPreparation {
            return Err(AppError::Conflict(
                "order is not awaiting delivery assignment".to_string(),
            ));
        }
        if order.provider_id != Some(provider_id) {
            return Err(AppError::Conflict(
                "order is confirmed for another provider".to_string(),
            ));
        }
        Ok(order.clone())
    })?;

    // A new attempt supersedes an abandoned offer, but never an active leg.
    state.store.delete_pending_trackings(order_id);
    let active = state
        .store
        .trackings_for_order(order_id)
        .into_iter()
        .any(|leg| !leg.status.is_terminal());
    if active {
        return Err(AppError::Conflict(
            "a delivery is already in progress for this order".to_string(),
        ));
    }

    let courier_account = state.store.user_by_phone(&phone);

    if courier_account
        .as_ref()
        .is_some_and(|account| account.id == order.client_id)
    {
        return Err(AppError::Validation(
            "the ordering client cannot be assigned as the courier".to_string(),
        ));
    }

    let provider_location = state.store.user(provider_id).and_then(|p| p.location());
    let distance_km = match (provider_location, order.delivery_location()) {
        (Some(provider), Some(delivery)) => {
            (haversine_km(&provider, &delivery) * 100.0).round() / 100.0
        }
        _ => 0.0,
    };

    match courier_account {
        Some(account) if account.id == provider_id => {
            self_delivery(state, order_id, provider_id, phone, distance_km)
        }
        Some(account) => {
            known_courier(state, order_id, account.id, phone, distance_km).await
        }
        None => invited_courier(state, order_id, phone, distance_km).await,
    }
}

fn self_delivery(
    state: &AppState,
    order_id: Uuid,
    provider_id: Uuid,
    phone: String,
    distance_km: f64,
) -> Result<AssignmentOutcome, AppError> {
    let mut tracking = new_tracking(order_id, Some(provider_id), phone.clone(), distance_km);
    tracking.status = TrackingStatus::Assigned;
    tracking.start_time = Some(Utc::now());
    state.store.insert_tracking(tracking.clone());

    // The provider trivially accepts their own mission.
    apply_order_status(
        state,
        order_id,
        TransitionRequest::to(OrderStatus::Assigned)
            .with_note("delivery assigned")
            .with_metadata(EventMetadata {
                assigned_to: Some(provider_id),
                courier_phone: Some(phone),
                ..Default::default()
            }),
    )?;

    info!(order_id = %order_id, provider_id = %provider_id, "provider delivers their own order");

    Ok(AssignmentOutcome {
        scenario: AssignmentScenario::SelfDelivery,
        tracking,
    })
}

async fn known_courier(
    state: &AppState,
    order_id: Uuid,
    courier_id: Uuid,
    phone: String,
    distance_km: f64,
) -> Result<AssignmentOutcome, AppError> {
    let tracking = new_tracking(order_id, Some(courier_id), phone.clone(), distance_km);
    state.store.insert_tracking(tracking.clone());

    state
        .metrics
        .realtime_events_total
        .with_label_values(&["delivery_request"])
        .inc();
    state.realtime.publish(
        Topic::User(courier_id),
        RealtimeEvent::DeliveryRequest(DeliveryRequest {
            order_id,
            tracking_id: tracking.id,
            note: "new delivery request".to_string(),
        }),
    );

    let message = format!(
        "{}: you have a pending delivery request {:.1} km away (~{}). Open the app to accept.",
        state.brand_name,
        distance_km,
        format_eta(distance_km)
    );
    send_sms(state, &phone, &message).await;

    info!(order_id = %order_id, courier_id = %courier_id, "delivery offered to registered courier");

    Ok(AssignmentOutcome {
        scenario: AssignmentScenario::KnownCourier,
        tracking,
    })
}

async fn invited_courier(
    state: &AppState,
    order_id: Uuid,
    phone: String,
    distance_km: f64,
) -> Result<AssignmentOutcome, AppError> {
    let tracking = new_tracking(order_id, None, phone.clone(), distance_km);
    state.store.insert_tracking(tracking.clone());

    let message = format!(
        "{}: a delivery is waiting for you. Install the app to accept it: https://quickly.app/download",
        state.brand_name
    );
    send_sms(state, &phone, &message).await;

    info!(order_id = %order_id, phone = %phone, "delivery offered to unregistered courier");

    Ok(AssignmentOutcome {
        scenario: AssignmentScenario::InvitedCourier,
        tracking,
    })
}

/// A courier's binding, exclusive claim on a pending leg. Only the first
/// accept that still observes `pending` wins; everyone else conflicts.
pub async fn accept_delivery(
    state: &AppState,
    tracking_id: Uuid,
    courier_id: Uuid,
    location: Option<GeoPoint>,
) -> Result<DeliveryTracking, AppError> {
    let tracking = state.store.update_tracking(tracking_id, |row| {
        if row.status != TrackingStatus::Pending {
            return Err(AppError::Conflict(
                "delivery request already processed".to_string(),
            ));
        }
        row.status = TrackingStatus::Assigned;
        row.assigned_to = Some(courier_id);
        row.start_time = Some(Utc::now());
        if let Some(location) = &location {
            row.latitude = Some(location.latitude);
            row.longitude = Some(location.longitude);
        }
        Ok(())
    })?;

    apply_order_status(
        state,
        tracking.order_id,
        TransitionRequest::to(OrderStatus::Assigned)
            .with_note("courier accepted the delivery")
            .with_metadata(EventMetadata {
                assigned_to: Some(courier_id),
                courier_phone: Some(tracking.phone.clone()),
                ..Default::default()
            }),
    )?;

    state
        .metrics
        .tracking_transitions_total
        .with_label_values(&[TrackingStatus::Assigned.as_str()])
        .inc();

    let message = format!(
        "{}: a courier accepted to take charge of your order.",
        state.brand_name
    );
    send_sms(state, &tracking.phone, &message).await;

    info!(tracking_id = %tracking_id, courier_id = %courier_id, "courier accepted delivery");

    Ok(tracking)
}

/// Rejection closes the offer and pushes the order back so the provider
/// can re-assign. Guarded by the same must-still-be-pending check.
pub async fn reject_delivery(
    state: &AppState,
    tracking_id: Uuid,
    courier_id: Uuid,
    reason: Option<String>,
) -> Result<DeliveryTracking, AppError> {
    let note = reason.unwrap_or_else(|| "declined by the courier".to_string());

    let tracking = state.store.update_tracking(tracking_id, |row| {
        if row.status != TrackingStatus::Pending {
            return Err(AppError::Conflict(
                "delivery request already processed".to_string(),
            ));
        }
        row.status = TrackingStatus::Rejected;
        row.note = Some(note.clone());
        row.end_time = Some(Utc::now());
        Ok(())
    })?;

    state
        .metrics
        .tracking_transitions_total
        .with_label_values(&[TrackingStatus::Rejected.as_str()])
        .inc();

    // The common case is a no-op: the order never left in_preparation
    // while the offer was pending.
    let needs_push_back = state
        .store
        .with_order(tracking.order_id, |order| {
            Ok(order.status != OrderStatus::InPreparation && !order.status.is_terminal())
        })
        .unwrap_or(false);
    if needs_push_back {
        apply_order_status(
            state,
            tracking.order_id,
            TransitionRequest::to(OrderStatus::InPreparation)
                .with_note("courier declined, awaiting re-assignment")
                .with_metadata(EventMetadata {
                    reason: Some(note.clone()),
                    ..Default::default()
                }),
        )?;
    }

    let message = format!(
        "{}: the courier declined the delivery. We are looking for another courier.",
        state.brand_name
    );
    send_sms(state, &tracking.phone, &message).await;

    info!(tracking_id = %tracking_id, courier_id = %courier_id, "courier rejected delivery");

    Ok(tracking)
}

/// Notification failures never unwind the transition they follow.
async fn send_sms(state: &AppState, phone: &str, message: &str) {
    if let Err(err) = state.notifier.notify(phone, message).await {
        warn!(phone = %phone, error = %err, "sms notification failed");
    }
}

fn new_tracking(
    order_id: Uuid,
    assigned_to: Option<Uuid>,
    phone: String,
    distance_km: f64,
) -> DeliveryTracking {
    DeliveryTracking {
        id: Uuid::new_v4(),
        order_id,
        assigned_to,
        phone,
        distance_km,
        latitude: None,
        longitude: None,
        location_address: None,
        status: TrackingStatus::Pending,
        start_time: None,
        end_time: None,
        proof_url: None,
        note: None,
        created_at: Utc::now(),
    }
}
