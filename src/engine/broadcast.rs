use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::engine::lifecycle::{apply_order_status, TransitionRequest};
use crate::error::AppError;
use crate::models::order::{EventMetadata, Order, OrderAccept, OrderStatus};
use crate::realtime::{
    OrderFeedEntry, OrderStatusUpdate, RealtimeEvent, Topic,
};
use crate::state::AppState;

/// Publish a payable order on the provider discovery feed and flip it to
/// `broadcasted`. The transition goes through the state machine, so a
/// second broadcast attempt conflicts instead of double-publishing a
/// live order.
pub fn broadcast_order(state: &AppState, order_id: Uuid) -> Result<Order, AppError> {
    let (order, _event) = apply_order_status(
        state,
        order_id,
        TransitionRequest::to(OrderStatus::Broadcasted).with_note("order published to providers"),
    )?;

    state
        .metrics
        .realtime_events_total
        .with_label_values(&["new_order"])
        .inc();
    state
        .realtime
        .publish(Topic::OrdersFeed, RealtimeEvent::NewOrder(OrderFeedEntry::from(&order)));

    info!(order_id = %order_id, "order broadcasted to provider feed");

    Ok(order)
}

/// Record a provider's non-binding vote of interest. Valid only while
/// the order is still exactly `broadcasted`; duplicates per (order,
/// provider) are rejected. The vote never moves the order - the client
/// resolves the pool by confirming one provider, and that confirmation
/// is the single serialization point that invalidates late votes.
pub fn record_interest(
    state: &AppState,
    order_id: Uuid,
    provider_id: Uuid,
    latitude: f64,
    longitude: f64,
    location_address: String,
) -> Result<OrderAccept, AppError> {
    state.store.with_order(order_id, |order| {
        if order.status != OrderStatus::Broadcasted {
            return Err(AppError::Conflict(
                "this order is no longer available".to_string(),
            ));
        }
        Ok(())
    })?;

    let accept = OrderAccept {
        id: Uuid::new_v4(),
        order_id,
        provider_id,
        latitude,
        longitude,
        location_address,
        created_at: Utc::now(),
    };

    state.store.record_accept(accept.clone())?;

    // Watching clients see the vote arrive without re-fetching the pool.
    state
        .metrics
        .realtime_events_total
        .with_label_values(&["status_update"])
        .inc();
    state.realtime.publish(
        Topic::Order(order_id),
        RealtimeEvent::OrderStatus(OrderStatusUpdate {
            order_id,
            status: OrderStatus::Accepted,
            note: Some("provider interested".to_string()),
            metadata: Some(EventMetadata {
                provider_id: Some(provider_id),
                ..Default::default()
            }),
        }),
    );

    info!(order_id = %order_id, provider_id = %provider_id, "provider vote recorded");

    Ok(accept)
}
