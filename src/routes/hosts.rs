use axum::{extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};

use crate::{auth::require_host_id, error::AppResult, state::AppState, tenancy::require_active_host};

pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<Value>> {
    let host_id = require_host_id(&state, &headers).await?;
    let host = require_active_host(&state, host_id).await?;
    Ok(Json(json!({
        "id": host.id,
        "email": host.email,
        "email_verified": host.email_verified,
        "display_name": host.display_name,
        "business_profile": host.business_profile,
        "timezone": host.timezone,
        "created_at": host.created_at,
    })))
}
