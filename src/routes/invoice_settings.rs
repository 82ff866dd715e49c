use axum::{extract::State, http::HeaderMap, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::{
    auth::require_host_id,
    db::db_pool,
    error::AppResult,
    schemas::{validate_input, InvoiceSettingsInput},
    services::{
        invoice_numbering::preview_next_invoice_number,
        invoice_settings::{settings_view, update_invoice_settings},
    },
    state::AppState,
    tenancy::require_active_host,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/invoice-settings",
            axum::routing::get(get_invoice_settings).put(put_invoice_settings),
        )
        .route(
            "/next-invoice-number",
            axum::routing::get(next_invoice_number),
        )
}

async fn get_invoice_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let host_id = require_host_id(&state, &headers).await?;
    let host = require_active_host(&state, host_id).await?;
    Ok(Json(settings_view(&host)))
}

async fn put_invoice_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<InvoiceSettingsInput>,
) -> AppResult<Json<Value>> {
    let host_id = require_host_id(&state, &headers).await?;
    require_active_host(&state, host_id).await?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let host = update_invoice_settings(pool, host_id, &payload).await?;
    Ok(Json(settings_view(&host)))
}

/// Preview only: the rolling counter is left untouched.
async fn next_invoice_number(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let host_id = require_host_id(&state, &headers).await?;
    require_active_host(&state, host_id).await?;
    let pool = db_pool(&state)?;

    let invoice_number =
        preview_next_invoice_number(pool, host_id, Utc::now(), state.config.default_timezone())
            .await?;
    Ok(Json(json!({ "invoice_number": invoice_number })))
}
