use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

/// Parses a path id. Malformed ids cannot match any row, so they read as 404.
pub fn parse_uuid(raw: &str, label: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::NotFound(format!("{label} not found.")))
}

/// Decodes an optional JSON body; an empty body yields the default value.
pub fn parse_optional_json<T>(body: &[u8]) -> Result<T, AppError>
where
    T: serde::de::DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|error| AppError::BadRequest(format!("Invalid JSON body: {error}")))
}

pub fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(1, 500)
}

fn default_limit_100() -> i64 {
    100
}

pub fn serialize_to_map<T>(value: &T) -> serde_json::Map<String, serde_json::Value>
where
    T: serde::Serialize,
{
    let json = serde_json::to_value(value)
        .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new()));
    json.as_object().cloned().unwrap_or_default()
}

pub fn remove_nulls(
    mut map: serde_json::Map<String, serde_json::Value>,
) -> serde_json::Map<String, serde_json::Value> {
    map.retain(|_, value| !value.is_null());
    map
}

// Reservations

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize, Validate)]
pub struct CreateReservationInput {
    #[validate(length(min = 1, max = 64))]
    pub reservation_number: Option<String>,
    #[validate(range(min = 0))]
    pub room_number: Option<i32>,
    pub checkin_date: Option<NaiveDate>,
    pub checkout_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize, Validate)]
pub struct UpdateReservationInput {
    #[validate(length(min = 1, max = 64))]
    pub reservation_number: Option<String>,
    #[validate(range(min = 0))]
    pub room_number: Option<i32>,
    #[validate(length(min = 1, max = 32))]
    pub apartment_code: Option<String>,
    pub checkin_date: Option<NaiveDate>,
    pub checkout_date: Option<NaiveDate>,
    pub invoice_type: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_name: Option<String>,
    pub tax_id: Option<String>,
    pub vat_eu: Option<String>,
    pub address: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub special_requests: Option<String>,
    pub service_name: Option<String>,
    #[validate(range(min = 0.0))]
    pub amount_paid: Option<f64>,
    #[validate(range(min = 0.0, max = 100.0))]
    pub vat_rate: Option<f64>,
    #[validate(range(min = 0.0))]
    pub vat_amount: Option<f64>,
    pub invoice_number: Option<String>,
    pub invoice_generated_at: Option<DateTime<Utc>>,
    pub guest_submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ReservationsQuery {
    #[serde(default = "default_limit_100")]
    pub limit: i64,
    pub submitted: Option<bool>,
    pub invoiced: Option<bool>,
    pub checkin_from: Option<NaiveDate>,
    pub checkin_to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ReservationPath {
    pub reservation_id: String,
}

/// Optional overrides for invoice generation.
#[derive(Debug, Clone, Default, Deserialize, serde::Serialize)]
pub struct GenerateInvoiceInput {
    pub service_name: Option<String>,
    pub amount_paid: Option<f64>,
    pub vat_rate: Option<f64>,
}

/// Fields a correction may replace. Absent (or null) fields keep the
/// reservation's current value.
#[derive(Debug, Clone, Default, Deserialize, serde::Serialize)]
pub struct InvoiceCorrectionInput {
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
}

// Guest portal

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize)]
pub struct GuestSubmissionInput {
    pub invoice_type: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_name: Option<String>,
    pub tax_id: Option<String>,
    pub vat_eu: Option<String>,
    pub address: Option<String>,
    pub email: Option<String>,
    pub special_requests: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct HostPath {
    pub host_id: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct GuestReservationPath {
    pub host_id: String,
    pub reservation_number: String,
}

// Building codes

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateBuildingCodeInput {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    #[serde(default)]
    pub display_order: i32,
}

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize, Validate)]
pub struct UpdateBuildingCodeInput {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub code: Option<String>,
    pub display_order: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct BuildingCodesQuery {
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct BuildingCodePath {
    pub code_id: String,
}

// Invoice settings

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize, Validate)]
pub struct InvoiceSettingsInput {
    pub display_name: Option<String>,
    pub issuer_name: Option<String>,
    pub issuer_address: Option<String>,
    pub issuer_tax_id: Option<String>,
    pub issuer_vat_eu: Option<String>,
    #[validate(email)]
    pub issuer_email: Option<String>,
    pub issuer_phone: Option<String>,
    pub issuer_bank_name: Option<String>,
    pub issuer_bank_account: Option<String>,
    pub numbering_pattern: Option<Value>,
    #[validate(range(min = 0))]
    pub rolling_number_current: Option<i64>,
    #[validate(range(min = 0, max = 365))]
    pub payment_days_due: Option<i32>,
    pub payment_instructions: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub default_service_name: Option<String>,
    #[validate(range(min = 0.0, max = 100.0))]
    pub default_vat_rate: Option<f64>,
    pub timezone: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        parse_optional_json, parse_uuid, remove_nulls, serialize_to_map, validate_input, CreateReservationInput,
        GenerateInvoiceInput, InvoiceCorrectionInput, InvoiceSettingsInput,
        UpdateReservationInput,
    };
    use crate::error::AppError;

    #[test]
    fn partial_updates_drop_absent_fields() {
        let input: UpdateReservationInput =
            serde_json::from_value(json!({"room_number": 4, "invoice_number": null}))
                .expect("parses");
        let patch = remove_nulls(serialize_to_map(&input));
        assert_eq!(patch.len(), 1);
        assert_eq!(patch.get("room_number"), Some(&json!(4)));
    }

    #[test]
    fn explicit_null_override_keeps_existing_value() {
        let input: InvoiceCorrectionInput =
            serde_json::from_value(json!({"company_name": null, "amount_paid": 990.0}))
                .expect("parses");
        assert!(input.company_name.is_none());
        assert_eq!(input.amount_paid, Some(990.0));
    }

    #[test]
    fn rejects_out_of_range_settings() {
        let input = InvoiceSettingsInput {
            default_vat_rate: Some(130.0),
            ..InvoiceSettingsInput::default()
        };
        assert!(matches!(
            validate_input(&input),
            Err(AppError::UnprocessableEntity(_))
        ));

        let input = InvoiceSettingsInput {
            issuer_email: Some("billing@example.com".to_string()),
            payment_days_due: Some(14),
            ..InvoiceSettingsInput::default()
        };
        assert!(validate_input(&input).is_ok());
    }

    #[test]
    fn empty_reservation_number_is_invalid() {
        let input = CreateReservationInput {
            reservation_number: Some(String::new()),
            ..CreateReservationInput::default()
        };
        assert!(validate_input(&input).is_err());
    }

    #[test]
    fn malformed_ids_read_as_not_found() {
        assert!(matches!(
            parse_uuid("42", "Reservation"),
            Err(AppError::NotFound(_))
        ));
        assert!(parse_uuid(" 550e8400-e29b-41d4-a716-446655440000 ", "Reservation").is_ok());
    }

    #[test]
    fn optional_body_defaults_when_empty() {
        let input: GenerateInvoiceInput = parse_optional_json(b"").expect("empty body");
        assert!(input.amount_paid.is_none());

        let input: GenerateInvoiceInput =
            parse_optional_json(br#"{"amount_paid": 450.5}"#).expect("json body");
        assert_eq!(input.amount_paid, Some(450.5));

        assert!(matches!(
            parse_optional_json::<GenerateInvoiceInput>(b"{not json"),
            Err(AppError::BadRequest(_))
        ));
    }
}
