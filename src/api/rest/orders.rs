use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::broadcast::{broadcast_order, record_interest};
use crate::engine::lifecycle::{apply_order_status, TransitionRequest};
use crate::engine::pricing::{compute_estimate, CatalogError};
use crate::engine::sweeper::{sweep_expired_orders, SweepReport};
use crate::error::AppError;
use crate::models::order::{
    EventMetadata, GeoPoint, Order, OrderAccept, OrderPhase, OrderStatus, OrderStatusEvent,
};
use crate::models::pricing::PricingEstimate;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/sweep", post(sweep_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/status", post(update_order_status))
        .route("/orders/:id/broadcast", post(broadcast))
        .route("/orders/:id/accepts", post(record_order_accept).get(list_order_accepts))
        .route("/orders/:id/events", get(list_order_events))
        .route("/pricing/estimate", post(estimate_pricing))
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub client_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub location: GeoPoint,
    pub location_address: String,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    if payload.quantity == 0 {
        return Err(AppError::Validation("quantity must be > 0".to_string()));
    }
    if payload.unit_price <= 0.0 {
        return Err(AppError::Validation("unit_price must be > 0".to_string()));
    }
    if payload.product_name.trim().is_empty() {
        return Err(AppError::Validation("product_name cannot be empty".to_string()));
    }

    // Priced at creation with the provider still unknown; the figures are
    // re-snapshotted at confirm time from the chosen provider's quote.
    let estimate = compute_estimate(
        payload.unit_price,
        payload.quantity,
        None,
        Some(&payload.location),
    );

    let order = Order {
        id: Uuid::new_v4(),
        client_id: payload.client_id,
        provider_id: None,
        courier_id: None,
        product_id: payload.product_id,
        product_name: payload.product_name,
        quantity: payload.quantity,
        unit_price: payload.unit_price,
        service_fee: estimate.service_fee,
        delivery_fee: estimate.delivery_fee,
        total_amount: estimate.total_amount,
        status: OrderStatus::Created,
        latitude: Some(payload.location.latitude),
        longitude: Some(payload.location.longitude),
        location_address: Some(payload.location_address),
        created_at: Utc::now(),
    };

    state.store.insert_order(order.clone());
    state.metrics.orders_created_total.inc();

    let (order, _event) = apply_order_status(
        &state,
        order.id,
        TransitionRequest::to(OrderStatus::PendingBroadcast).with_note("order created"),
    )?;

    Ok(Json(order))
}

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    pub client_id: Uuid,
    pub phase: Option<OrderPhase>,
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListOrdersQuery>,
) -> Json<Vec<Order>> {
    let orders = state
        .store
        .orders_by_client(query.client_id)
        .into_iter()
        .filter(|order| match query.phase {
            Some(phase) => order.status.phase() == phase,
            None => true,
        })
        .collect();

    Json(orders)
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .store
        .order(id)
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

    Ok(Json(order))
}

#[derive(Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    pub note: Option<String>,
    pub metadata: Option<EventMetadata>,
    pub location: Option<GeoPoint>,
}

async fn update_order_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<Json<Order>, AppError> {
    let (order, _event) = apply_order_status(
        &state,
        id,
        TransitionRequest {
            target: payload.status,
            note: payload.note,
            metadata: payload.metadata,
            location: payload.location,
        },
    )?;

    Ok(Json(order))
}

async fn broadcast(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = broadcast_order(&state, id)?;
    Ok(Json(order))
}

#[derive(Deserialize)]
pub struct RecordAcceptRequest {
    pub provider_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub location_address: String,
}

async fn record_order_accept(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RecordAcceptRequest>,
) -> Result<Json<OrderAccept>, AppError> {
    let accept = record_interest(
        &state,
        id,
        payload.provider_id,
        payload.latitude,
        payload.longitude,
        payload.location_address,
    )?;

    Ok(Json(accept))
}

async fn list_order_accepts(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Json<Vec<OrderAccept>> {
    Json(state.store.accepts_for_order(id))
}

async fn list_order_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<OrderStatusEvent>>, AppError> {
    // Presence check first so an unknown order is distinguishable from
    // one with an empty history.
    state.store.with_order(id, |_| Ok(()))?;
    Ok(Json(state.store.order_events(id)))
}

async fn sweep_orders(State(state): State<Arc<AppState>>) -> Json<SweepReport> {
    Json(sweep_expired_orders(&state))
}

#[derive(Deserialize)]
pub struct EstimatePricingRequest {
    pub product_id: Uuid,
    pub quantity: u32,
    pub unit_price: Option<f64>,
    pub provider_location: Option<GeoPoint>,
    pub client_location: Option<GeoPoint>,
}

async fn estimate_pricing(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EstimatePricingRequest>,
) -> Result<Json<PricingEstimate>, AppError> {
    if payload.quantity == 0 {
        return Err(AppError::Validation("quantity must be > 0".to_string()));
    }

    let unit_price = match payload.unit_price {
        Some(price) if price > 0.0 => price,
        Some(_) => return Err(AppError::Validation("unit_price must be > 0".to_string())),
        None => state
            .catalog
            .unit_price(payload.product_id)
            .await
            .map_err(|err| match err {
                CatalogError::ProductNotFound(id) => {
                    AppError::NotFound(format!("product {id} not found"))
                }
                CatalogError::Unavailable(msg) => AppError::Downstream(msg),
            })?,
    };

    let estimate = compute_estimate(
        unit_price,
        payload.quantity,
        payload.provider_location.as_ref(),
        payload.client_location.as_ref(),
    );

    Ok(Json(estimate))
}
