use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::GeoPoint;

/// A registered account. Account management itself is out of scope; the
/// coordinator only resolves phone numbers to accounts when staffing a
/// delivery leg, so this carries just what that resolution needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: Uuid,
    pub full_name: String,
    /// Normalized E.164-style phone, unique across accounts.
    pub phone: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn location(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }
}
