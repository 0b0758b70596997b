use serde::{Deserialize, Serialize};

/// Fee breakdown for a quote. Produced fresh on every request and never
/// persisted as its own row; the order snapshots the figures at confirm
/// time so later rate changes cannot alter a placed order.
///
/// When provider coordinates are unknown the min/max band communicates
/// the uncertainty; with a known provider the band degenerates to the
/// exact delivery fee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingEstimate {
    pub product_price: f64,
    pub service_fee: f64,
    pub delivery_fee: f64,
    pub delivery_fee_min: f64,
    pub delivery_fee_max: f64,
    pub total_amount: f64,
    pub distance_km: f64,
}
