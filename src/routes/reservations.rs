use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{NaiveDate, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::{
    auth::require_host_id,
    db::{db_pool, map_db_error},
    error::{AppError, AppResult},
    models::INVOICE_TYPES,
    repository::{
        table_service::{create_row, delete_row, list_rows, update_row, ListOptions},
        tenant_store::{self, get_reservation_by_number, get_reservation_for_update},
    },
    schemas::{
        clamp_limit, parse_optional_json, parse_uuid, remove_nulls, serialize_to_map,
        validate_input, CreateReservationInput, GenerateInvoiceInput, InvoiceCorrectionInput,
        ReservationPath, ReservationsQuery, UpdateReservationInput,
    },
    services::{
        access_codes::generate_apartment_code,
        csv_export::{build_reservations_csv, export_filename},
        guest_window::host_timezone,
        invoice_corrections, invoice_generation,
        invoice_guard::ensure_invoice_number_available,
    },
    state::AppState,
    tenancy::require_active_host,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/reservations",
            axum::routing::get(list_reservations).post(create_reservation),
        )
        .route("/reservations/export-csv", axum::routing::get(export_csv))
        .route(
            "/reservations/{reservation_id}",
            axum::routing::get(get_reservation)
                .patch(update_reservation)
                .delete(delete_reservation),
        )
        .route(
            "/reservations/{reservation_id}/reset",
            axum::routing::post(reset_reservation),
        )
        .route(
            "/reservations/{reservation_id}/generate-invoice",
            axum::routing::post(generate_invoice),
        )
        .route(
            "/reservations/{reservation_id}/correction",
            axum::routing::post(create_correction),
        )
        .route(
            "/reservations/{reservation_id}/versions",
            axum::routing::get(list_versions),
        )
}

async fn list_reservations(
    State(state): State<AppState>,
    Query(query): Query<ReservationsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let host_id = require_host_id(&state, &headers).await?;
    require_active_host(&state, host_id).await?;
    let pool = db_pool(&state)?;

    let filters = list_filters(&query);
    let rows = list_rows(
        pool,
        "reservations",
        host_id,
        ListOptions {
            filters: Some(&filters),
            limit: clamp_limit(query.limit),
            offset: 0,
            order_by: "checkin_date",
            ascending: false,
        },
    )
    .await?;
    Ok(Json(json!({ "data": rows })))
}

fn list_filters(query: &ReservationsQuery) -> Map<String, Value> {
    let mut filters = Map::new();
    if let Some(submitted) = query.submitted {
        filters.insert(
            "guest_submitted_at__is_null".to_string(),
            Value::Bool(!submitted),
        );
    }
    if let Some(invoiced) = query.invoiced {
        filters.insert("invoice_number__is_null".to_string(), Value::Bool(!invoiced));
    }
    if let Some(from) = query.checkin_from {
        filters.insert(
            "checkin_date__gte".to_string(),
            Value::String(from.to_string()),
        );
    }
    if let Some(to) = query.checkin_to {
        filters.insert("checkin_date__lte".to_string(), Value::String(to.to_string()));
    }
    filters
}

async fn create_reservation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateReservationInput>,
) -> AppResult<impl IntoResponse> {
    let host_id = require_host_id(&state, &headers).await?;
    require_active_host(&state, host_id).await?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let (reservation_number, room_number, checkin_date, checkout_date) =
        required_reservation_fields(&payload)?;

    if get_reservation_by_number(pool, host_id, &reservation_number, false)
        .await
        .map_err(map_db_error)?
        .is_some()
    {
        return Err(AppError::Conflict(
            "Reservation number already exists.".to_string(),
        ));
    }

    let mut record = Map::new();
    record.insert(
        "reservation_number".to_string(),
        Value::String(reservation_number),
    );
    record.insert("room_number".to_string(), json!(room_number));
    record.insert(
        "apartment_code".to_string(),
        Value::String(generate_apartment_code()),
    );
    record.insert(
        "checkin_date".to_string(),
        Value::String(checkin_date.to_string()),
    );
    record.insert(
        "checkout_date".to_string(),
        Value::String(checkout_date.to_string()),
    );

    let created = create_row(pool, "reservations", host_id, &record).await?;
    tracing::info!(
        host_id = %host_id,
        reservation_number = %value_str(&created, "reservation_number"),
        "Reservation created"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

fn required_reservation_fields(
    payload: &CreateReservationInput,
) -> AppResult<(String, i32, NaiveDate, NaiveDate)> {
    let reservation_number = non_empty_opt(payload.reservation_number.as_deref());
    let (Some(reservation_number), Some(room_number), Some(checkin), Some(checkout)) = (
        reservation_number,
        payload.room_number,
        payload.checkin_date,
        payload.checkout_date,
    ) else {
        return Err(AppError::UnprocessableEntity(
            "Missing required fields: reservation_number, room_number, checkin_date, checkout_date."
                .to_string(),
        ));
    };
    ensure_stay_dates(checkin, checkout)?;
    Ok((reservation_number, room_number, checkin, checkout))
}

fn ensure_stay_dates(checkin: NaiveDate, checkout: NaiveDate) -> AppResult<()> {
    if checkout <= checkin {
        return Err(AppError::UnprocessableEntity(
            "checkout_date must be after checkin_date.".to_string(),
        ));
    }
    Ok(())
}

async fn get_reservation(
    State(state): State<AppState>,
    Path(path): Path<ReservationPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let host_id = require_host_id(&state, &headers).await?;
    require_active_host(&state, host_id).await?;
    let pool = db_pool(&state)?;
    let reservation_id = reservation_uuid(&path)?;

    let reservation = tenant_store::get_reservation(pool, host_id, reservation_id)
        .await
        .map_err(map_db_error)?
        .ok_or_else(reservation_not_found)?;
    Ok(Json(json!(reservation)))
}

async fn update_reservation(
    State(state): State<AppState>,
    Path(path): Path<ReservationPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateReservationInput>,
) -> AppResult<Json<Value>> {
    let host_id = require_host_id(&state, &headers).await?;
    require_active_host(&state, host_id).await?;
    validate_input(&payload)?;
    let pool = db_pool(&state)?;
    let reservation_id = reservation_uuid(&path)?;

    let mut patch = remove_nulls(serialize_to_map(&payload));
    if patch.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }
    if let Some(invoice_type) = payload.invoice_type.as_deref() {
        if !INVOICE_TYPES.contains(&invoice_type.trim()) {
            return Err(AppError::UnprocessableEntity(
                "invoice_type must be 'individual' or 'business'.".to_string(),
            ));
        }
    }
    let invoice_number = match payload.invoice_number.as_deref() {
        Some(raw) => {
            let trimmed = non_empty_opt(Some(raw)).ok_or_else(|| {
                AppError::UnprocessableEntity("invoice_number cannot be empty.".to_string())
            })?;
            patch.insert(
                "invoice_number".to_string(),
                Value::String(trimmed.clone()),
            );
            Some(trimmed)
        }
        None => None,
    };

    let mut tx = pool.begin().await.map_err(map_db_error)?;
    let current = get_reservation_for_update(&mut *tx, host_id, reservation_id)
        .await
        .map_err(map_db_error)?
        .ok_or_else(reservation_not_found)?;
    ensure_stay_dates(
        payload.checkin_date.unwrap_or(current.checkin_date),
        payload.checkout_date.unwrap_or(current.checkout_date),
    )?;
    if let Some(number) = invoice_number.as_deref() {
        ensure_invoice_number_available(&mut *tx, host_id, number, Some(reservation_id)).await?;
    }

    let updated = update_row(&mut *tx, "reservations", host_id, reservation_id, &patch).await?;
    tx.commit().await.map_err(map_db_error)?;

    tracing::info!(
        host_id = %host_id,
        reservation_id = %reservation_id,
        fields = ?patch.keys().collect::<Vec<_>>(),
        "Reservation updated"
    );
    Ok(Json(updated))
}

async fn delete_reservation(
    State(state): State<AppState>,
    Path(path): Path<ReservationPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let host_id = require_host_id(&state, &headers).await?;
    require_active_host(&state, host_id).await?;
    let pool = db_pool(&state)?;
    let reservation_id = reservation_uuid(&path)?;

    let deleted = delete_row(pool, "reservations", host_id, reservation_id).await?;
    tracing::info!(host_id = %host_id, reservation_id = %reservation_id, "Reservation deleted");
    Ok(Json(deleted))
}

async fn reset_reservation(
    State(state): State<AppState>,
    Path(path): Path<ReservationPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let host_id = require_host_id(&state, &headers).await?;
    require_active_host(&state, host_id).await?;
    let pool = db_pool(&state)?;
    let reservation_id = reservation_uuid(&path)?;

    let reservation = tenant_store::reset_reservation(pool, host_id, reservation_id)
        .await
        .map_err(map_db_error)?
        .ok_or_else(reservation_not_found)?;
    tracing::info!(host_id = %host_id, reservation_id = %reservation_id, "Reservation reset");
    Ok(Json(json!(reservation)))
}

async fn generate_invoice(
    State(state): State<AppState>,
    Path(path): Path<ReservationPath>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let host_id = require_host_id(&state, &headers).await?;
    require_active_host(&state, host_id).await?;
    let pool = db_pool(&state)?;
    let reservation_id = reservation_uuid(&path)?;
    let overrides: GenerateInvoiceInput = parse_optional_json(&body)?;

    let reservation = invoice_generation::generate_invoice(
        pool,
        host_id,
        reservation_id,
        &overrides,
        Utc::now(),
        state.config.default_timezone(),
    )
    .await?;
    Ok(Json(json!(reservation)))
}

async fn create_correction(
    State(state): State<AppState>,
    Path(path): Path<ReservationPath>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let host_id = require_host_id(&state, &headers).await?;
    require_active_host(&state, host_id).await?;
    let pool = db_pool(&state)?;
    let reservation_id = reservation_uuid(&path)?;
    let overrides: InvoiceCorrectionInput = parse_optional_json(&body)?;

    let outcome = invoice_corrections::create_correction(
        pool,
        host_id,
        reservation_id,
        &overrides,
        Utc::now(),
    )
    .await?;
    Ok(Json(json!({
        "reservation": outcome.reservation,
        "version": outcome.version_number,
    })))
}

async fn list_versions(
    State(state): State<AppState>,
    Path(path): Path<ReservationPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let host_id = require_host_id(&state, &headers).await?;
    require_active_host(&state, host_id).await?;
    let pool = db_pool(&state)?;
    let reservation_id = reservation_uuid(&path)?;

    let versions = invoice_corrections::list_versions(pool, host_id, reservation_id).await?;
    Ok(Json(json!({ "data": versions })))
}

async fn export_csv(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let host_id = require_host_id(&state, &headers).await?;
    let host = require_active_host(&state, host_id).await?;
    let pool = db_pool(&state)?;

    let reservations = tenant_store::list_reservations(pool, host_id)
        .await
        .map_err(map_db_error)?;
    let today = Utc::now()
        .with_timezone(&host_timezone(&host.timezone, state.config.default_timezone()))
        .date_naive();
    let filename = export_filename(today);

    tracing::info!(host_id = %host_id, rows = reservations.len(), "Reservations exported");
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={filename}"),
            ),
        ],
        build_reservations_csv(&reservations),
    ))
}

fn reservation_uuid(path: &ReservationPath) -> AppResult<Uuid> {
    parse_uuid(&path.reservation_id, "Reservation")
}

fn reservation_not_found() -> AppError {
    AppError::NotFound("Reservation not found.".to_string())
}

fn value_str(row: &Value, key: &str) -> String {
    row.as_object()
        .and_then(|obj| obj.get(key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_default()
}

fn non_empty_opt(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
}
