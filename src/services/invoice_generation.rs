use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::{
    models::{Host, Reservation},
    repository::tenant_store::{
        get_host, get_reservation_for_update, update_invoice_fields, InvoiceFieldsUpdate,
    },
    schemas::GenerateInvoiceInput,
    services::{
        invoice_errors::InvoiceError, invoice_guard::ensure_invoice_number_available,
        invoice_numbering::allocate_invoice_number,
    },
};

/// Host-level fallbacks used when neither the request nor the reservation
/// carries a value.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceDefaults {
    pub service_name: String,
    pub vat_rate: f64,
}

impl Default for InvoiceDefaults {
    fn default() -> Self {
        Self {
            service_name: "Apartment Rental".to_string(),
            vat_rate: 8.0,
        }
    }
}

impl From<&Host> for InvoiceDefaults {
    fn from(host: &Host) -> Self {
        let fallback = Self::default();
        Self {
            service_name: Some(host.default_service_name.trim())
                .filter(|name| !name.is_empty())
                .map(ToOwned::to_owned)
                .unwrap_or(fallback.service_name),
            vat_rate: if host.default_vat_rate.is_finite() && host.default_vat_rate >= 0.0 {
                host.default_vat_rate
            } else {
                fallback.vat_rate
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedInvoiceAmounts {
    pub service_name: String,
    pub amount_paid: f64,
    pub vat_rate: f64,
    pub vat_amount: f64,
}

/// VAT contained in a gross (VAT-inclusive) amount, rounded to cents.
pub fn compute_vat_amount(amount_paid: f64, vat_rate: f64) -> f64 {
    round_cents(amount_paid * vat_rate / (100.0 + vat_rate))
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn validate_vat_rate(vat_rate: f64) -> Result<f64, InvoiceError> {
    if vat_rate.is_finite() && vat_rate >= 0.0 {
        Ok(vat_rate)
    } else {
        Err(InvoiceError::InvalidVatRate)
    }
}

/// Layers request overrides over reservation values over host defaults.
pub fn resolve_invoice_amounts(
    reservation: &Reservation,
    overrides: &GenerateInvoiceInput,
    defaults: &InvoiceDefaults,
) -> Result<ResolvedInvoiceAmounts, InvoiceError> {
    let service_name = non_empty(overrides.service_name.as_deref())
        .or_else(|| non_empty(reservation.service_name.as_deref()))
        .unwrap_or_else(|| defaults.service_name.clone());

    let amount_paid = overrides
        .amount_paid
        .or(reservation.amount_paid)
        .ok_or(InvoiceError::MissingAmount)?;
    if amount_paid == 0.0 {
        return Err(InvoiceError::MissingAmount);
    }
    if !amount_paid.is_finite() || amount_paid < 0.0 {
        return Err(InvoiceError::InvalidAmount);
    }

    let vat_rate = validate_vat_rate(
        overrides
            .vat_rate
            .or(reservation.vat_rate)
            .unwrap_or(defaults.vat_rate),
    )?;

    Ok(ResolvedInvoiceAmounts {
        service_name,
        amount_paid,
        vat_rate,
        vat_amount: compute_vat_amount(amount_paid, vat_rate),
    })
}

/// Generates an invoice for a reservation whose guest has submitted details.
///
/// The reservation row and the host row are locked for the duration of the
/// transaction, so the counter increment, the uniqueness check and the write
/// either all land or none do. Re-running it allocates a fresh number and
/// overwrites the previous invoice fields.
pub async fn generate_invoice(
    pool: &sqlx::PgPool,
    host_id: Uuid,
    reservation_id: Uuid,
    overrides: &GenerateInvoiceInput,
    now: DateTime<Utc>,
    fallback_tz: Tz,
) -> Result<Reservation, InvoiceError> {
    let mut tx = pool.begin().await?;

    let reservation = get_reservation_for_update(&mut *tx, host_id, reservation_id)
        .await?
        .ok_or(InvoiceError::ReservationNotFound)?;
    if reservation.guest_submitted_at.is_none() {
        return Err(InvoiceError::GuestNotSubmitted);
    }

    let host = get_host(&mut *tx, host_id)
        .await?
        .ok_or(InvoiceError::HostNotFound)?;
    let amounts = resolve_invoice_amounts(&reservation, overrides, &InvoiceDefaults::from(&host))?;

    let invoice_number = allocate_invoice_number(&mut tx, host_id, now, fallback_tz).await?;
    ensure_invoice_number_available(&mut *tx, host_id, &invoice_number, Some(reservation.id))
        .await?;

    let fields = InvoiceFieldsUpdate {
        invoice_type: reservation.invoice_type.as_deref(),
        first_name: reservation.first_name.as_deref(),
        last_name: reservation.last_name.as_deref(),
        company_name: reservation.company_name.as_deref(),
        tax_id: reservation.tax_id.as_deref(),
        vat_eu: reservation.vat_eu.as_deref(),
        address: reservation.address.as_deref(),
        service_name: Some(amounts.service_name.as_str()),
        amount_paid: Some(amounts.amount_paid),
        vat_rate: Some(amounts.vat_rate),
        vat_amount: Some(amounts.vat_amount),
        invoice_number: &invoice_number,
        invoice_generated_at: now,
    };
    let updated = update_invoice_fields(&mut *tx, host_id, reservation.id, &fields)
        .await
        .map_err(|error| duplicate_or_storage(error, &invoice_number))?;

    tx.commit().await?;

    tracing::info!(
        host_id = %host_id,
        reservation_id = %reservation.id,
        invoice_number = %invoice_number,
        amount_paid = amounts.amount_paid,
        vat_amount = amounts.vat_amount,
        "Invoice generated"
    );
    Ok(updated)
}

/// The partial unique index on `(host_id, invoice_number)` is the last line
/// against concurrent writers that slipped past the guard.
pub(crate) fn duplicate_or_storage(error: sqlx::Error, invoice_number: &str) -> InvoiceError {
    if crate::db::is_unique_violation(&error) {
        return InvoiceError::DuplicateInvoiceNumber(invoice_number.to_string());
    }
    InvoiceError::Storage(error)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::{
        compute_vat_amount, resolve_invoice_amounts, round_cents, InvoiceDefaults,
    };
    use crate::{
        models::sample_reservation, schemas::GenerateInvoiceInput,
        services::invoice_errors::InvoiceError,
    };

    #[test]
    fn extracts_vat_from_gross_amount() {
        assert_eq!(compute_vat_amount(1200.0, 8.0), 88.89);
        assert_eq!(compute_vat_amount(800.0, 8.0), 59.26);
        assert_eq!(compute_vat_amount(123.0, 23.0), 23.0);
        assert_eq!(compute_vat_amount(500.0, 0.0), 0.0);
    }

    #[test]
    fn rounds_to_cents() {
        assert_eq!(round_cents(1.005_1), 1.01);
        assert_eq!(round_cents(2.344), 2.34);
    }

    #[test]
    fn overrides_take_precedence() {
        let reservation = sample_reservation();
        let overrides = GenerateInvoiceInput {
            service_name: Some("Studio stay".to_string()),
            amount_paid: Some(540.0),
            vat_rate: Some(23.0),
        };
        let resolved =
            resolve_invoice_amounts(&reservation, &overrides, &InvoiceDefaults::default())
                .expect("resolves");
        assert_eq!(resolved.service_name, "Studio stay");
        assert_eq!(resolved.amount_paid, 540.0);
        assert_eq!(resolved.vat_rate, 23.0);
        assert_eq!(resolved.vat_amount, 100.98);
    }

    #[test]
    fn falls_back_to_reservation_then_defaults() {
        let mut reservation = sample_reservation();
        reservation.service_name = None;
        reservation.vat_rate = None;
        reservation.amount_paid = Some(1200.0);
        let defaults = InvoiceDefaults {
            service_name: "Apartment Rental".to_string(),
            vat_rate: 8.0,
        };
        let resolved =
            resolve_invoice_amounts(&reservation, &GenerateInvoiceInput::default(), &defaults)
                .expect("resolves");
        assert_eq!(resolved.service_name, "Apartment Rental");
        assert_eq!(resolved.vat_rate, 8.0);
        assert_eq!(resolved.vat_amount, 88.89);
    }

    #[test]
    fn missing_amount_is_rejected() {
        let mut reservation = sample_reservation();
        reservation.amount_paid = None;
        let result = resolve_invoice_amounts(
            &reservation,
            &GenerateInvoiceInput::default(),
            &InvoiceDefaults::default(),
        );
        assert!(matches!(result, Err(InvoiceError::MissingAmount)));

        let zero = GenerateInvoiceInput {
            amount_paid: Some(0.0),
            ..GenerateInvoiceInput::default()
        };
        let result = resolve_invoice_amounts(&reservation, &zero, &InvoiceDefaults::default());
        assert!(matches!(result, Err(InvoiceError::MissingAmount)));
    }

    #[test]
    fn negative_amount_and_rate_are_rejected() {
        let reservation = sample_reservation();
        let negative_amount = GenerateInvoiceInput {
            amount_paid: Some(-10.0),
            ..GenerateInvoiceInput::default()
        };
        assert!(matches!(
            resolve_invoice_amounts(&reservation, &negative_amount, &InvoiceDefaults::default()),
            Err(InvoiceError::InvalidAmount)
        ));

        let negative_rate = GenerateInvoiceInput {
            vat_rate: Some(-100.0),
            ..GenerateInvoiceInput::default()
        };
        assert!(matches!(
            resolve_invoice_amounts(&reservation, &negative_rate, &InvoiceDefaults::default()),
            Err(InvoiceError::InvalidVatRate)
        ));
    }
}
