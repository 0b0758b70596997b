use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::{
    EventMetadata, GeoPoint, Order, OrderStatus, OrderStatusEvent,
};
use crate::realtime::{OrderLocationUpdate, OrderStatusUpdate, RealtimeEvent, Topic};
use crate::state::AppState;

/// One requested transition. `metadata` is mandatory (and checked) for
/// `confirmed`; `location` updates the row coordinates and triggers an
/// extra `location_update` broadcast.
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub target: OrderStatus,
    pub note: Option<String>,
    pub metadata: Option<EventMetadata>,
    pub location: Option<GeoPoint>,
}

impl TransitionRequest {
    pub fn to(target: OrderStatus) -> Self {
        Self {
            target,
            note: None,
            metadata: None,
            location: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_location(mut self, location: GeoPoint) -> Self {
        self.location = Some(location);
        self
    }
}

/// The authoritative order transition: validate against the persisted
/// status, commit the row mutation together with the audit event, then
/// fan out. Racing callers serialize on the row lock; the loser gets a
/// conflict and must re-read before retrying.
pub fn apply_order_status(
    state: &AppState,
    order_id: Uuid,
    request: TransitionRequest,
) -> Result<(Order, OrderStatusEvent), AppError> {
    if request.target == OrderStatus::Confirmed {
        let complete = request.metadata.as_ref().is_some_and(|m| {
            m.provider_id.is_some() && m.delivery_fee.is_some() && m.total_amount.is_some()
        });
        if !complete {
            return Err(AppError::Validation(
                "provider_id, delivery_fee and total_amount are required to confirm an order"
                    .to_string(),
            ));
        }
    }

    let target = request.target;
    let result = state.store.transition_order(order_id, |order| {
        if !order.status.can_transition_to(target) {
            return Err(AppError::Conflict(format!(
                "cannot move order from {} to {}",
                order.status, target
            )));
        }

        order.status = target;

        if let Some(metadata) = &request.metadata {
            if target == OrderStatus::Confirmed {
                // The order is priced and staffed atomically with this
                // write; a confirmed-but-unpriced order cannot exist.
                order.provider_id = metadata.provider_id;
                if let Some(delivery_fee) = metadata.delivery_fee {
                    order.delivery_fee = delivery_fee;
                }
                if let Some(total_amount) = metadata.total_amount {
                    order.total_amount = total_amount;
                }
            }
            if target == OrderStatus::Assigned {
                if let Some(courier_id) = metadata.assigned_to {
                    order.courier_id = Some(courier_id);
                }
            }
        }

        if let Some(location) = &request.location {
            order.latitude = Some(location.latitude);
            order.longitude = Some(location.longitude);
        }

        Ok(OrderStatusEvent {
            id: Uuid::new_v4(),
            order_id,
            status: target,
            note: request.note.clone(),
            metadata: request.metadata.clone(),
            created_at: Utc::now(),
        })
    });

    let (order, event) = match result {
        Ok(committed) => committed,
        Err(err) => {
            if matches!(err, AppError::Conflict(_)) {
                state.metrics.transition_conflicts_total.inc();
            }
            return Err(err);
        }
    };

    state
        .metrics
        .order_transitions_total
        .with_label_values(&[target.as_str()])
        .inc();

    publish_order_status(state, &event);

    if let Some(location) = request.location {
        publish_order_location(state, order_id, location);
    }

    info!(order_id = %order_id, status = %target, "order status updated");

    Ok((order, event))
}

fn publish_order_status(state: &AppState, event: &OrderStatusEvent) {
    state.metrics.realtime_events_total.with_label_values(&["status_update"]).inc();
    state.realtime.publish(
        Topic::Order(event.order_id),
        RealtimeEvent::OrderStatus(OrderStatusUpdate {
            order_id: event.order_id,
            status: event.status,
            note: event.note.clone(),
            metadata: event.metadata.clone(),
        }),
    );
}

pub(crate) fn publish_order_location(state: &AppState, order_id: Uuid, location: GeoPoint) {
    state.metrics.realtime_events_total.with_label_values(&["location_update"]).inc();
    state.realtime.publish(
        Topic::Order(order_id),
        RealtimeEvent::OrderLocation(OrderLocationUpdate {
            order_id,
            latitude: location.latitude,
            longitude: location.longitude,
        }),
    );
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{apply_order_status, TransitionRequest};
    use crate::error::AppError;
    use crate::models::order::{EventMetadata, GeoPoint, Order, OrderStatus};
    use crate::state::AppState;

    fn seed_order(state: &AppState, id_seed: u128, status: OrderStatus) -> Uuid {
        let id = Uuid::from_u128(id_seed);
        state.store.insert_order(Order {
            id,
            client_id: Uuid::from_u128(1_000),
            provider_id: None,
            courier_id: None,
            product_id: Uuid::from_u128(1_001),
            product_name: "gas bottle".to_string(),
            quantity: 2,
            unit_price: 1_000.0,
            service_fee: 200.0,
            delivery_fee: 5_000.0,
            total_amount: 7_200.0,
            status,
            latitude: Some(5.36),
            longitude: Some(-4.0),
            location_address: Some("Abidjan, Cocody".to_string()),
            created_at: Utc::now(),
        });
        id
    }

    #[test]
    fn legal_transition_writes_row_and_event() {
        let state = AppState::new(16, 5);
        let id = seed_order(&state, 1, OrderStatus::Created);

        let (order, event) =
            apply_order_status(&state, id, TransitionRequest::to(OrderStatus::PendingBroadcast))
                .unwrap();

        assert_eq!(order.status, OrderStatus::PendingBroadcast);
        assert_eq!(event.status, OrderStatus::PendingBroadcast);
        assert_eq!(state.store.order_events(id).len(), 1);
    }

    #[test]
    fn illegal_transition_is_a_conflict_and_mutates_nothing() {
        let state = AppState::new(16, 5);
        let id = seed_order(&state, 2, OrderStatus::Created);

        let err = apply_order_status(&state, id, TransitionRequest::to(OrderStatus::Delivered))
            .unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(state.store.order(id).unwrap().status, OrderStatus::Created);
        assert!(state.store.order_events(id).is_empty());
    }

    #[test]
    fn unknown_order_is_not_found() {
        let state = AppState::new(16, 5);
        let err = apply_order_status(
            &state,
            Uuid::from_u128(999),
            TransitionRequest::to(OrderStatus::Cancelled),
        )
        .unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn confirm_requires_complete_metadata() {
        let state = AppState::new(16, 5);
        let id = seed_order(&state, 3, OrderStatus::Broadcasted);

        // no metadata at all
        let err = apply_order_status(&state, id, TransitionRequest::to(OrderStatus::Confirmed))
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        // partial metadata
        let partial = EventMetadata {
            provider_id: Some(Uuid::from_u128(77)),
            ..Default::default()
        };
        let err = apply_order_status(
            &state,
            id,
            TransitionRequest::to(OrderStatus::Confirmed).with_metadata(partial),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        // nothing was written
        assert_eq!(state.store.order(id).unwrap().status, OrderStatus::Broadcasted);
        assert!(state.store.order_events(id).is_empty());
    }

    #[test]
    fn confirm_snapshots_provider_and_fees_onto_the_row() {
        let state = AppState::new(16, 5);
        let id = seed_order(&state, 4, OrderStatus::Broadcasted);
        let provider = Uuid::from_u128(77);

        let metadata = EventMetadata {
            provider_id: Some(provider),
            delivery_fee: Some(1_000.0),
            total_amount: Some(3_200.0),
            ..Default::default()
        };

        let (order, event) = apply_order_status(
            &state,
            id,
            TransitionRequest::to(OrderStatus::Confirmed).with_metadata(metadata.clone()),
        )
        .unwrap();

        assert_eq!(order.provider_id, Some(provider));
        assert_eq!(order.delivery_fee, 1_000.0);
        assert_eq!(order.total_amount, 3_200.0);
        assert_eq!(event.metadata, Some(metadata));
    }

    #[test]
    fn terminal_orders_reject_further_writes() {
        let state = AppState::new(16, 5);
        let id = seed_order(&state, 5, OrderStatus::Completed);

        let err = apply_order_status(&state, id, TransitionRequest::to(OrderStatus::Cancelled))
            .unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn location_bearing_transition_also_publishes_location() {
        let state = AppState::new(16, 5);
        let id = seed_order(&state, 6, OrderStatus::Assigned);
        let mut rx = state.realtime.subscribe();

        apply_order_status(
            &state,
            id,
            TransitionRequest::to(OrderStatus::InDelivery).with_location(GeoPoint {
                latitude: 5.37,
                longitude: -4.01,
            }),
        )
        .unwrap();

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first.event, "status_update");
        assert_eq!(second.event, "location_update");

        let order = state.store.order(id).unwrap();
        assert_eq!(order.latitude, Some(5.37));
    }
}
