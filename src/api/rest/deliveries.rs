use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::assignment::{
    accept_delivery, assign_delivery, reject_delivery, AssignmentOutcome,
};
use crate::engine::tracking::{apply_delivery_status, update_courier_position, TrackingUpdate};
use crate::error::AppError;
use crate::models::order::GeoPoint;
use crate::models::tracking::{DeliveryTracking, TrackingStatus};
use crate::notify::normalize_phone;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders/:id/delivery", post(assign))
        .route("/deliveries", get(list_deliveries))
        .route("/deliveries/:id", get(get_delivery))
        .route("/deliveries/:id/accept", post(accept))
        .route("/deliveries/:id/reject", post(reject))
        .route("/deliveries/:id/status", post(update_status))
        .route("/couriers/:id/position", post(update_position))
}

#[derive(Deserialize)]
pub struct AssignDeliveryRequest {
    pub provider_id: Uuid,
    pub courier_phone: String,
}

async fn assign(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<AssignDeliveryRequest>,
) -> Result<Json<AssignmentOutcome>, AppError> {
    let outcome = assign_delivery(
        &state,
        order_id,
        payload.provider_id,
        &payload.courier_phone,
    )
    .await?;

    Ok(Json(outcome))
}

#[derive(Deserialize)]
pub struct ListDeliveriesQuery {
    pub phone: String,
}

/// A courier's task list. Rejected offers are history the courier closed
/// themselves; they are filtered out here like everywhere else.
async fn list_deliveries(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListDeliveriesQuery>,
) -> Json<Vec<DeliveryTracking>> {
    let phone = normalize_phone(&query.phone);
    let legs = state
        .store
        .trackings_by_phone(&phone)
        .into_iter()
        .filter(|leg| leg.status != TrackingStatus::Rejected)
        .collect();

    Json(legs)
}

async fn get_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryTracking>, AppError> {
    let tracking = state
        .store
        .tracking(id)
        .ok_or_else(|| AppError::NotFound(format!("tracking {id} not found")))?;

    Ok(Json(tracking))
}

#[derive(Deserialize)]
pub struct AcceptDeliveryRequest {
    pub courier_id: Uuid,
    pub location: Option<GeoPoint>,
}

async fn accept(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AcceptDeliveryRequest>,
) -> Result<Json<DeliveryTracking>, AppError> {
    let tracking = accept_delivery(&state, id, payload.courier_id, payload.location).await?;
    Ok(Json(tracking))
}

#[derive(Deserialize)]
pub struct RejectDeliveryRequest {
    pub courier_id: Uuid,
    pub reason: Option<String>,
}

async fn reject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RejectDeliveryRequest>,
) -> Result<Json<DeliveryTracking>, AppError> {
    let tracking = reject_delivery(&state, id, payload.courier_id, payload.reason).await?;
    Ok(Json(tracking))
}

#[derive(Deserialize)]
pub struct UpdateDeliveryStatusRequest {
    pub status: TrackingStatus,
    pub note: Option<String>,
    pub location: Option<GeoPoint>,
    pub proof_url: Option<String>,
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateDeliveryStatusRequest>,
) -> Result<Json<DeliveryTracking>, AppError> {
    let tracking = apply_delivery_status(
        &state,
        id,
        payload.status,
        TrackingUpdate {
            note: payload.note,
            location: payload.location,
            proof_url: payload.proof_url,
        },
    )?;

    Ok(Json(tracking))
}

#[derive(Deserialize)]
pub struct UpdatePositionRequest {
    pub location: GeoPoint,
}

async fn update_position(
    State(state): State<Arc<AppState>>,
    Path(courier_id): Path<Uuid>,
    Json(payload): Json<UpdatePositionRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let updated = update_courier_position(&state, courier_id, payload.location)?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}
