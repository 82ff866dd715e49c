use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::{
    db::{db_pool, map_db_error},
    error::{AppError, AppResult},
    models::Reservation,
    repository::tenant_store::get_reservation_by_number,
    routes::building_codes::{active_building_codes, guest_building_codes},
    schemas::{parse_uuid, GuestReservationPath, GuestSubmissionInput},
    services::{
        guest_submission::{submission_allowed, submit_guest_details, SubmissionError},
        guest_window::host_timezone,
    },
    state::AppState,
    tenancy::require_public_host,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/public/hosts/{host_id}/reservations/{reservation_number}",
            axum::routing::get(guest_reservation),
        )
        .route(
            "/public/hosts/{host_id}/reservations/{reservation_number}/submit",
            axum::routing::post(guest_submit),
        )
}

async fn guest_reservation(
    State(state): State<AppState>,
    Path(path): Path<GuestReservationPath>,
) -> AppResult<Json<Value>> {
    let host_id = parse_uuid(&path.host_id, "Host")?;
    let host = require_public_host(&state, host_id).await?;
    let pool = db_pool(&state)?;

    let reservation = get_reservation_by_number(pool, host_id, path.reservation_number.trim(), false)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "Reservation \"{}\" not found.",
                path.reservation_number.trim()
            ))
        })?;

    let timezone = host_timezone(&host.timezone, state.config.default_timezone());
    let can_edit = submission_allowed(&reservation, Utc::now(), timezone);
    let building_codes = active_building_codes(pool, host_id).await?;
    Ok(Json(stay_view(
        &reservation,
        can_edit,
        guest_building_codes(&building_codes),
    )))
}

async fn guest_submit(
    State(state): State<AppState>,
    Path(path): Path<GuestReservationPath>,
    Json(payload): Json<GuestSubmissionInput>,
) -> AppResult<Json<Value>> {
    let host_id = parse_uuid(&path.host_id, "Host")?;
    require_public_host(&state, host_id).await?;
    let pool = db_pool(&state)?;

    let reservation = submit_guest_details(
        pool,
        host_id,
        path.reservation_number.trim(),
        &payload,
        Utc::now(),
        state.config.default_timezone(),
    )
    .await
    .map_err(|error| match error {
        SubmissionError::Invalid(errors) => AppError::Validation(errors),
        SubmissionError::Rejected(inner) => AppError::from(inner),
    })?;

    let building_codes = active_building_codes(pool, host_id).await?;
    Ok(Json(submission_receipt(
        &reservation,
        guest_building_codes(&building_codes),
    )))
}

/// What a guest sees before submitting. Access codes are only revealed once
/// details have been submitted.
fn stay_view(reservation: &Reservation, can_edit: bool, building_codes: Vec<Value>) -> Value {
    let already_submitted = reservation.guest_submitted_at.is_some();
    json!({
        "reservation_number": reservation.reservation_number,
        "room_number": reservation.room_number,
        "checkin_date": reservation.checkin_date,
        "checkout_date": reservation.checkout_date,
        "apartment_code": already_submitted.then(|| reservation.apartment_code.clone()),
        "already_submitted": already_submitted,
        "can_edit": can_edit,
        "guest_details": {
            "invoice_type": reservation.invoice_type,
            "first_name": reservation.first_name,
            "last_name": reservation.last_name,
            "company_name": reservation.company_name,
            "tax_id": reservation.tax_id,
            "vat_eu": reservation.vat_eu,
            "address": reservation.address,
            "email": reservation.email,
            "special_requests": reservation.special_requests,
        },
        "building_codes": building_codes,
    })
}

fn submission_receipt(reservation: &Reservation, building_codes: Vec<Value>) -> Value {
    json!({
        "reservation_number": reservation.reservation_number,
        "room_number": reservation.room_number,
        "checkin_date": reservation.checkin_date,
        "checkout_date": reservation.checkout_date,
        "apartment_code": reservation.apartment_code,
        "display_name": reservation.display_name(),
        "invoice_type": reservation.invoice_type,
        "email": reservation.email,
        "address": reservation.address,
        "building_codes": building_codes,
    })
}
