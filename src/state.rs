use std::sync::Arc;

use crate::engine::pricing::{InMemoryCatalog, ProductCatalog};
use crate::notify::{LogNotifier, Notifier};
use crate::observability::metrics::Metrics;
use crate::realtime::RealtimePublisher;
use crate::store::Store;

pub struct AppState {
    pub store: Store,
    pub realtime: RealtimePublisher,
    pub notifier: Arc<dyn Notifier>,
    pub catalog: Arc<dyn ProductCatalog>,
    pub metrics: Metrics,
    pub order_ttl: chrono::Duration,
    pub brand_name: String,
}

impl AppState {
    pub fn new(event_buffer_size: usize, order_ttl_minutes: i64) -> Self {
        Self::with_collaborators(
            event_buffer_size,
            order_ttl_minutes,
            Arc::new(LogNotifier),
            Arc::new(InMemoryCatalog::new()),
        )
    }

    pub fn with_collaborators(
        event_buffer_size: usize,
        order_ttl_minutes: i64,
        notifier: Arc<dyn Notifier>,
        catalog: Arc<dyn ProductCatalog>,
    ) -> Self {
        Self {
            store: Store::new(),
            realtime: RealtimePublisher::new(event_buffer_size),
            notifier,
            catalog,
            metrics: Metrics::new(),
            order_ttl: chrono::Duration::minutes(order_ttl_minutes),
            brand_name: "Quickly".to_string(),
        }
    }
}
