use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::{
    auth::require_host_id,
    db::{db_pool, map_db_error},
    error::{AppError, AppResult},
    models::BuildingCode,
    repository::{
        table_service::{create_row, delete_row, get_row, list_rows, update_row, ListOptions},
        tenant_store::list_active_building_codes,
    },
    schemas::{
        parse_uuid, remove_nulls, serialize_to_map, validate_input, BuildingCodePath,
        BuildingCodesQuery, CreateBuildingCodeInput, HostPath, UpdateBuildingCodeInput,
    },
    state::AppState,
    tenancy::{require_active_host, require_public_host},
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/building-codes",
            axum::routing::get(list_building_codes).post(create_building_code),
        )
        .route(
            "/building-codes/{code_id}",
            axum::routing::get(get_building_code)
                .patch(update_building_code)
                .delete(delete_building_code),
        )
        .route(
            "/public/hosts/{host_id}/building-codes",
            axum::routing::get(public_building_codes),
        )
}

/// Active codes of a host in display order.
pub async fn active_building_codes(
    pool: &sqlx::PgPool,
    host_id: Uuid,
) -> AppResult<Vec<BuildingCode>> {
    list_active_building_codes(pool, host_id)
        .await
        .map_err(map_db_error)
}

/// Name and code only; guests never see ordering or activation flags.
pub fn guest_building_codes(codes: &[BuildingCode]) -> Vec<Value> {
    codes
        .iter()
        .map(|code| json!({ "name": code.name, "code": code.code }))
        .collect()
}

fn display_order(filters: Option<&Map<String, Value>>) -> ListOptions<'_> {
    ListOptions {
        filters,
        limit: 200,
        offset: 0,
        order_by: "display_order",
        ascending: true,
    }
}

async fn public_building_codes(
    State(state): State<AppState>,
    Path(path): Path<HostPath>,
) -> AppResult<Json<Value>> {
    let host_id = parse_uuid(&path.host_id, "Host")?;
    require_public_host(&state, host_id).await?;
    let pool = db_pool(&state)?;

    let codes = active_building_codes(pool, host_id).await?;
    Ok(Json(json!({ "data": guest_building_codes(&codes) })))
}

async fn list_building_codes(
    State(state): State<AppState>,
    Query(query): Query<BuildingCodesQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let host_id = require_host_id(&state, &headers).await?;
    require_active_host(&state, host_id).await?;
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    if let Some(is_active) = query.is_active {
        filters.insert("is_active".to_string(), Value::Bool(is_active));
    }
    let codes = list_rows(pool, "building_codes", host_id, display_order(Some(&filters))).await?;
    Ok(Json(json!({ "data": codes })))
}

async fn create_building_code(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateBuildingCodeInput>,
) -> AppResult<impl IntoResponse> {
    let host_id = require_host_id(&state, &headers).await?;
    require_active_host(&state, host_id).await?;
    let payload = CreateBuildingCodeInput {
        name: payload.name.trim().to_string(),
        code: payload.code.trim().to_string(),
        ..payload
    };
    validate_input(&payload).map_err(|_| {
        AppError::UnprocessableEntity("Name and code are required.".to_string())
    })?;
    let pool = db_pool(&state)?;

    let created = create_row(pool, "building_codes", host_id, &serialize_to_map(&payload)).await?;
    tracing::info!(host_id = %host_id, "Building code created");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_building_code(
    State(state): State<AppState>,
    Path(path): Path<BuildingCodePath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let host_id = require_host_id(&state, &headers).await?;
    require_active_host(&state, host_id).await?;
    let pool = db_pool(&state)?;
    let code_id = parse_uuid(&path.code_id, "Building code")?;

    let code = get_row(pool, "building_codes", host_id, code_id).await?;
    Ok(Json(code))
}

async fn update_building_code(
    State(state): State<AppState>,
    Path(path): Path<BuildingCodePath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateBuildingCodeInput>,
) -> AppResult<Json<Value>> {
    let host_id = require_host_id(&state, &headers).await?;
    require_active_host(&state, host_id).await?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;
    let code_id = parse_uuid(&path.code_id, "Building code")?;

    let patch = remove_nulls(serialize_to_map(&payload));
    let updated = update_row(pool, "building_codes", host_id, code_id, &patch).await?;
    Ok(Json(updated))
}

async fn delete_building_code(
    State(state): State<AppState>,
    Path(path): Path<BuildingCodePath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let host_id = require_host_id(&state, &headers).await?;
    require_active_host(&state, host_id).await?;
    let pool = db_pool(&state)?;
    let code_id = parse_uuid(&path.code_id, "Building code")?;

    let deleted = delete_row(pool, "building_codes", host_id, code_id).await?;
    tracing::info!(host_id = %host_id, code_id = %code_id, "Building code deleted");
    Ok(Json(deleted))
}
