use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::geo::{haversine_km, DEFAULT_DISTANCE_KM};
use crate::models::order::GeoPoint;
use crate::models::pricing::PricingEstimate;

/// Delivery rate once a provider is known.
const DELIVERY_RATE_PER_KM: f64 = 500.0;
/// Band rates quoted while the provider is still unknown.
const DELIVERY_RATE_MIN_PER_KM: f64 = 150.0;
const DELIVERY_RATE_MAX_PER_KM: f64 = 200.0;
/// Every delivery is billed for at least this distance.
const MIN_BILLABLE_KM: f64 = 1.0;

const SERVICE_FEE_LOW: f64 = 200.0;
const SERVICE_FEE_MID: f64 = 400.0;
const SERVICE_FEE_HIGH: f64 = 700.0;
const SERVICE_FEE_LOW_CEILING: f64 = 5_000.0;
const SERVICE_FEE_MID_CEILING: f64 = 10_000.0;

/// Pure fee computation: identical inputs always produce identical
/// output. The min/max delivery band widens only while the provider is
/// unknown; once both endpoints are known it collapses to the exact fee.
pub fn compute_estimate(
    unit_price: f64,
    quantity: u32,
    provider: Option<&GeoPoint>,
    client: Option<&GeoPoint>,
) -> PricingEstimate {
    let product_price = unit_price * f64::from(quantity);
    let service_fee = service_fee(product_price);

    let distance_km = match (provider, client) {
        (Some(provider), Some(client)) => round2(haversine_km(provider, client).max(MIN_BILLABLE_KM)),
        _ => DEFAULT_DISTANCE_KM,
    };

    let delivery_fee = distance_km.max(MIN_BILLABLE_KM) * DELIVERY_RATE_PER_KM;
    let (delivery_fee_min, delivery_fee_max) = if provider.is_some() {
        (delivery_fee, delivery_fee)
    } else {
        (
            distance_km * DELIVERY_RATE_MIN_PER_KM,
            distance_km * DELIVERY_RATE_MAX_PER_KM,
        )
    };

    PricingEstimate {
        product_price,
        service_fee,
        delivery_fee,
        delivery_fee_min,
        delivery_fee_max,
        total_amount: product_price + service_fee + delivery_fee,
        distance_km,
    }
}

fn service_fee(product_price: f64) -> f64 {
    if product_price <= SERVICE_FEE_LOW_CEILING {
        SERVICE_FEE_LOW
    } else if product_price <= SERVICE_FEE_MID_CEILING {
        SERVICE_FEE_MID
    } else {
        SERVICE_FEE_HIGH
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("product {0} not found")]
    ProductNotFound(Uuid),
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Remote unit-price source, consulted only when a quote request omits
/// `unit_price`. The fee math itself never leaves the process, so a
/// caller-supplied price quotes deterministically even when this is down.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn unit_price(&self, product_id: Uuid) -> Result<f64, CatalogError>;
}

/// In-memory catalog used by the default wiring and the tests.
#[derive(Default)]
pub struct InMemoryCatalog {
    prices: DashMap<Uuid, f64>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, product_id: Uuid, unit_price: f64) {
        self.prices.insert(product_id, unit_price);
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn unit_price(&self, product_id: Uuid) -> Result<f64, CatalogError> {
        self.prices
            .get(&product_id)
            .map(|entry| *entry.value())
            .ok_or(CatalogError::ProductNotFound(product_id))
    }
}
