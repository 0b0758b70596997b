use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tokio::time::{interval, Duration};
use tracing::{error, info};
use uuid::Uuid;

use crate::engine::lifecycle::{apply_order_status, TransitionRequest};
use crate::models::order::{EventMetadata, OrderStatus};
use crate::state::AppState;

/// Orders that never left these states within the TTL are force-expired.
const PRE_ACCEPTANCE: [OrderStatus; 3] = [
    OrderStatus::Created,
    OrderStatus::PendingBroadcast,
    OrderStatus::Broadcasted,
];

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub expired: usize,
    pub order_ids: Vec<Uuid>,
}

/// One idempotent pass. The status filter doubles as the concurrency
/// guard: an order that got accepted since the scan simply fails the
/// re-validation inside the state machine, and one failing order never
/// aborts the rest of the batch.
pub fn sweep_expired_orders(state: &AppState) -> SweepReport {
    let started = Instant::now();
    let deadline = Utc::now() - state.order_ttl;
    let ttl_minutes = state.order_ttl.num_minutes();

    let stale = state.store.orders_matching(|order| {
        PRE_ACCEPTANCE.contains(&order.status) && order.created_at < deadline
    });

    let mut order_ids = Vec::new();
    for order in stale {
        let result = apply_order_status(
            state,
            order.id,
            TransitionRequest::to(OrderStatus::Expired)
                .with_note("order expired automatically")
                .with_metadata(EventMetadata {
                    reason: Some("timeout".to_string()),
                    expired_after_minutes: Some(ttl_minutes),
                    ..Default::default()
                }),
        );

        match result {
            Ok(_) => {
                state.metrics.orders_expired_total.inc();
                order_ids.push(order.id);
            }
            // Lost the race against a real transition; nothing to do.
            Err(err) => {
                error!(order_id = %order.id, error = %err, "failed to expire order");
            }
        }
    }

    state
        .metrics
        .sweep_duration_seconds
        .observe(started.elapsed().as_secs_f64());

    if !order_ids.is_empty() {
        info!(expired = order_ids.len(), "expired stale orders");
    }

    SweepReport {
        expired: order_ids.len(),
        order_ids,
    }
}

/// Periodic driver. The same sweep is exposed as a REST command for
/// deployments that prefer an external timer.
pub async fn run_expiration_sweeper(state: Arc<AppState>, sweep_interval: Duration) {
    info!(interval_secs = sweep_interval.as_secs(), "expiration sweeper started");

    let mut ticker = interval(sweep_interval);
    loop {
        ticker.tick().await;
        sweep_expired_orders(&state);
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::sweep_expired_orders;
    use crate::models::order::{Order, OrderStatus};
    use crate::state::AppState;

    fn seed_order(state: &AppState, id_seed: u128, status: OrderStatus, age_minutes: i64) -> Uuid {
        let id = Uuid::from_u128(id_seed);
        state.store.insert_order(Order {
            id,
            client_id: Uuid::from_u128(7_000),
            provider_id: None,
            courier_id: None,
            product_id: Uuid::from_u128(7_001),
            product_name: "bread basket".to_string(),
            quantity: 1,
            unit_price: 500.0,
            service_fee: 200.0,
            delivery_fee: 5_000.0,
            total_amount: 5_700.0,
            status,
            latitude: None,
            longitude: None,
            location_address: None,
            created_at: Utc::now() - Duration::minutes(age_minutes),
        });
        id
    }

    #[test]
    fn stale_pre_acceptance_orders_expire() {
        let state = AppState::new(16, 5);
        let stale = seed_order(&state, 1, OrderStatus::Broadcasted, 6);
        let fresh = seed_order(&state, 2, OrderStatus::Broadcasted, 2);

        let report = sweep_expired_orders(&state);

        assert_eq!(report.expired, 1);
        assert_eq!(report.order_ids, vec![stale]);
        assert_eq!(state.store.order(stale).unwrap().status, OrderStatus::Expired);
        assert_eq!(state.store.order(fresh).unwrap().status, OrderStatus::Broadcasted);
    }

    #[test]
    fn orders_past_the_acceptance_phase_are_left_untouched() {
        let state = AppState::new(16, 5);
        let accepted = seed_order(&state, 3, OrderStatus::Accepted, 10);
        let confirmed = seed_order(&state, 4, OrderStatus::Confirmed, 10);

        let report = sweep_expired_orders(&state);

        assert_eq!(report.expired, 0);
        assert_eq!(state.store.order(accepted).unwrap().status, OrderStatus::Accepted);
        assert_eq!(state.store.order(confirmed).unwrap().status, OrderStatus::Confirmed);
    }

    #[test]
    fn sweep_is_idempotent() {
        let state = AppState::new(16, 5);
        let stale = seed_order(&state, 5, OrderStatus::PendingBroadcast, 20);

        assert_eq!(sweep_expired_orders(&state).expired, 1);
        assert_eq!(sweep_expired_orders(&state).expired, 0);
        assert_eq!(state.store.order(stale).unwrap().status, OrderStatus::Expired);
        // exactly one expiry event was logged
        assert_eq!(state.store.order_events(stale).len(), 1);
    }

    #[test]
    fn expiry_event_records_the_timeout_reason() {
        let state = AppState::new(16, 5);
        let stale = seed_order(&state, 6, OrderStatus::Created, 30);

        sweep_expired_orders(&state);

        let events = state.store.order_events(stale);
        let metadata = events[0].metadata.as_ref().unwrap();
        assert_eq!(metadata.reason.as_deref(), Some("timeout"));
        assert_eq!(metadata.expired_after_minutes, Some(5));
    }
}
