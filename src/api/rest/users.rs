use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::GeoPoint;
use crate::models::user::UserAccount;
use crate::notify::{is_valid_phone, normalize_phone};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/:id", get(get_user))
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub full_name: String,
    pub phone: String,
    pub location: Option<GeoPoint>,
    pub address: Option<String>,
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<UserAccount>, AppError> {
    if payload.full_name.trim().is_empty() {
        return Err(AppError::Validation("full_name cannot be empty".to_string()));
    }

    let phone = normalize_phone(&payload.phone);
    if !is_valid_phone(&phone) {
        return Err(AppError::Validation(
            "unsupported phone number format".to_string(),
        ));
    }

    if state.store.user_by_phone(&phone).is_some() {
        return Err(AppError::Conflict(
            "an account already exists for this phone".to_string(),
        ));
    }

    let user = UserAccount {
        id: Uuid::new_v4(),
        full_name: payload.full_name,
        phone,
        latitude: payload.location.map(|l| l.latitude),
        longitude: payload.location.map(|l| l.longitude),
        address: payload.address,
        created_at: Utc::now(),
    };

    state.store.insert_user(user.clone());
    Ok(Json(user))
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserAccount>, AppError> {
    let user = state
        .store
        .user(id)
        .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?;

    Ok(Json(user))
}
