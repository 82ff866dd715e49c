use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    models::{InvoiceVersion, Reservation, INVOICE_TYPES},
    repository::tenant_store::{
        count_invoice_versions, get_host, get_reservation, get_reservation_for_update,
        insert_invoice_version, list_invoice_versions, update_invoice_fields,
        InvoiceFieldsUpdate,
    },
    schemas::InvoiceCorrectionInput,
    services::{
        invoice_errors::InvoiceError,
        invoice_generation::{
            compute_vat_amount, duplicate_or_storage, validate_vat_rate, InvoiceDefaults,
        },
        invoice_guard::ensure_invoice_number_available,
    },
};

pub const CORRECTION_SUFFIX: &str = "_CORRECTED";

/// Invoice state captured in an `invoice_versions` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceSnapshot {
    pub invoice_type: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_name: Option<String>,
    pub tax_id: Option<String>,
    pub vat_eu: Option<String>,
    pub address: Option<String>,
    pub service_name: Option<String>,
    pub amount_paid: Option<f64>,
    pub vat_rate: Option<f64>,
    pub vat_amount: Option<f64>,
    pub invoice_generated_at: Option<DateTime<Utc>>,
}

impl InvoiceSnapshot {
    pub fn from_reservation(reservation: &Reservation) -> Self {
        Self {
            invoice_type: reservation.invoice_type.clone(),
            first_name: reservation.first_name.clone(),
            last_name: reservation.last_name.clone(),
            company_name: reservation.company_name.clone(),
            tax_id: reservation.tax_id.clone(),
            vat_eu: reservation.vat_eu.clone(),
            address: reservation.address.clone(),
            service_name: reservation.service_name.clone(),
            amount_paid: reservation.amount_paid,
            vat_rate: reservation.vat_rate,
            vat_amount: reservation.vat_amount,
            invoice_generated_at: reservation.invoice_generated_at,
        }
    }

    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn as_update<'a>(&'a self, invoice_number: &'a str, generated_at: DateTime<Utc>) -> InvoiceFieldsUpdate<'a> {
        InvoiceFieldsUpdate {
            invoice_type: self.invoice_type.as_deref(),
            first_name: self.first_name.as_deref(),
            last_name: self.last_name.as_deref(),
            company_name: self.company_name.as_deref(),
            tax_id: self.tax_id.as_deref(),
            vat_eu: self.vat_eu.as_deref(),
            address: self.address.as_deref(),
            service_name: self.service_name.as_deref(),
            amount_paid: self.amount_paid,
            vat_rate: self.vat_rate,
            vat_amount: self.vat_amount,
            invoice_number,
            invoice_generated_at: generated_at,
        }
    }
}

/// Everything a correction writes, computed before touching storage.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionPlan {
    /// Version 1 to backfill when no history exists yet.
    pub original: Option<InvoiceSnapshot>,
    pub original_invoice_number: String,
    pub version_number: i32,
    pub invoice_number: String,
    pub snapshot: InvoiceSnapshot,
}

#[derive(Debug, Clone)]
pub struct CorrectionOutcome {
    pub reservation: Reservation,
    pub version_number: i32,
}

/// Strips any correction suffix from `current` and appends the one for
/// `version_number`: `_CORRECTED` for version 2, `_CORRECTED_{n-1}` after.
pub fn correction_invoice_number(current: &str, version_number: i32) -> String {
    let base = current
        .split(CORRECTION_SUFFIX)
        .next()
        .unwrap_or(current);
    if version_number <= 2 {
        format!("{base}{CORRECTION_SUFFIX}")
    } else {
        format!("{base}{CORRECTION_SUFFIX}_{}", version_number - 1)
    }
}

pub fn plan_correction(
    reservation: &Reservation,
    existing_versions: i64,
    overrides: &InvoiceCorrectionInput,
    defaults: &InvoiceDefaults,
    now: DateTime<Utc>,
) -> Result<CorrectionPlan, InvoiceError> {
    let current_number = reservation
        .invoice_number
        .as_deref()
        .map(str::trim)
        .filter(|number| !number.is_empty())
        .ok_or(InvoiceError::NoInvoiceToCorrect)?;

    let (original, existing) = if existing_versions <= 0 {
        (Some(InvoiceSnapshot::from_reservation(reservation)), 1)
    } else {
        (None, existing_versions)
    };
    let version_number =
        i32::try_from(existing + 1).map_err(|_| InvoiceError::NoInvoiceToCorrect)?;

    let invoice_type = match overrides.invoice_type.as_deref().map(str::trim) {
        Some(value) if INVOICE_TYPES.contains(&value) => Some(value.to_string()),
        Some(_) => return Err(InvoiceError::InvalidInvoiceType),
        None => reservation.invoice_type.clone(),
    };

    let amount_paid = overrides.amount_paid.or(reservation.amount_paid);
    if amount_paid.is_some_and(|amount| !amount.is_finite() || amount < 0.0) {
        return Err(InvoiceError::InvalidAmount);
    }
    let vat_rate = validate_vat_rate(
        overrides
            .vat_rate
            .or(reservation.vat_rate)
            .unwrap_or(defaults.vat_rate),
    )?;
    let vat_amount = match amount_paid {
        Some(amount) if amount != 0.0 => compute_vat_amount(amount, vat_rate),
        _ => 0.0,
    };

    let pick = |value: &Option<String>, existing: &Option<String>| {
        value.clone().or_else(|| existing.clone())
    };
    let snapshot = InvoiceSnapshot {
        invoice_type,
        first_name: pick(&overrides.first_name, &reservation.first_name),
        last_name: pick(&overrides.last_name, &reservation.last_name),
        company_name: pick(&overrides.company_name, &reservation.company_name),
        tax_id: pick(&overrides.tax_id, &reservation.tax_id),
        vat_eu: pick(&overrides.vat_eu, &reservation.vat_eu),
        address: pick(&overrides.address, &reservation.address),
        service_name: pick(&overrides.service_name, &reservation.service_name),
        amount_paid,
        vat_rate: Some(vat_rate),
        vat_amount: Some(vat_amount),
        invoice_generated_at: Some(now),
    };

    Ok(CorrectionPlan {
        original,
        original_invoice_number: current_number.to_string(),
        version_number,
        invoice_number: correction_invoice_number(current_number, version_number),
        snapshot,
    })
}

/// Records a correction: backfills version 1 if needed, stores the new
/// version and rewrites the reservation's live invoice fields, all in one
/// transaction with the reservation row locked.
pub async fn create_correction(
    pool: &sqlx::PgPool,
    host_id: Uuid,
    reservation_id: Uuid,
    overrides: &InvoiceCorrectionInput,
    now: DateTime<Utc>,
) -> Result<CorrectionOutcome, InvoiceError> {
    let mut tx = pool.begin().await?;

    let reservation = get_reservation_for_update(&mut *tx, host_id, reservation_id)
        .await?
        .ok_or(InvoiceError::ReservationNotFound)?;
    let host = get_host(&mut *tx, host_id)
        .await?
        .ok_or(InvoiceError::HostNotFound)?;

    let existing = count_invoice_versions(&mut *tx, reservation.id).await?;
    let plan = plan_correction(
        &reservation,
        existing,
        overrides,
        &InvoiceDefaults::from(&host),
        now,
    )?;

    if let Some(original) = &plan.original {
        insert_invoice_version(
            &mut *tx,
            reservation.id,
            1,
            &plan.original_invoice_number,
            &original.to_json()?,
            now,
        )
        .await?;
        tracing::debug!(reservation_id = %reservation.id, "Backfilled original invoice version");
    }

    ensure_invoice_number_available(&mut *tx, host_id, &plan.invoice_number, Some(reservation.id))
        .await?;

    insert_invoice_version(
        &mut *tx,
        reservation.id,
        plan.version_number,
        &plan.invoice_number,
        &plan.snapshot.to_json()?,
        now,
    )
    .await?;

    let updated = update_invoice_fields(
        &mut *tx,
        host_id,
        reservation.id,
        &plan.snapshot.as_update(&plan.invoice_number, now),
    )
    .await
    .map_err(|error| duplicate_or_storage(error, &plan.invoice_number))?;

    tx.commit().await?;

    tracing::info!(
        host_id = %host_id,
        reservation_id = %reservation.id,
        version = plan.version_number,
        invoice_number = %plan.invoice_number,
        "Invoice correction recorded"
    );
    Ok(CorrectionOutcome {
        reservation: updated,
        version_number: plan.version_number,
    })
}

/// Version history of a host's reservation, oldest first.
pub async fn list_versions(
    pool: &sqlx::PgPool,
    host_id: Uuid,
    reservation_id: Uuid,
) -> Result<Vec<InvoiceVersion>, InvoiceError> {
    let reservation = get_reservation(pool, host_id, reservation_id)
        .await?
        .ok_or(InvoiceError::ReservationNotFound)?;
    Ok(list_invoice_versions(pool, reservation.id).await?)
}
