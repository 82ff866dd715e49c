use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Values accepted for `reservations.invoice_type`.
pub const INVOICE_TYPES: &[&str] = &["individual", "business"];

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Host {
    pub id: Uuid,
    pub email: String,
    pub email_verified: bool,
    pub display_name: Option<String>,
    pub business_profile: String,
    pub timezone: String,
    pub issuer_name: Option<String>,
    pub issuer_address: Option<String>,
    pub issuer_tax_id: Option<String>,
    pub issuer_vat_eu: Option<String>,
    pub issuer_email: Option<String>,
    pub issuer_phone: Option<String>,
    pub issuer_bank_name: Option<String>,
    pub issuer_bank_account: Option<String>,
    pub numbering_pattern: Value,
    pub rolling_number_current: i64,
    pub payment_days_due: i32,
    pub payment_instructions: Option<String>,
    pub default_service_name: String,
    pub default_vat_rate: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Reservation {
    pub id: Uuid,
    pub host_id: Uuid,
    pub reservation_number: String,
    pub room_number: i32,
    pub apartment_code: String,
    pub checkin_date: NaiveDate,
    pub checkout_date: NaiveDate,
    pub invoice_type: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_name: Option<String>,
    pub tax_id: Option<String>,
    pub vat_eu: Option<String>,
    pub address: Option<String>,
    pub email: Option<String>,
    pub special_requests: Option<String>,
    pub service_name: Option<String>,
    pub amount_paid: Option<f64>,
    pub vat_rate: Option<f64>,
    pub vat_amount: Option<f64>,
    pub invoice_number: Option<String>,
    pub invoice_generated_at: Option<DateTime<Utc>>,
    pub guest_submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn display_name(&self) -> Option<String> {
        match self.invoice_type.as_deref() {
            Some("business") => self.company_name.clone(),
            Some("individual") => {
                let name = [self.first_name.as_deref(), self.last_name.as_deref()]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" ");
                Some(name).filter(|value| !value.is_empty())
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InvoiceVersion {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub version_number: i32,
    pub invoice_number: String,
    pub invoice_data: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BuildingCode {
    pub id: Uuid,
    pub host_id: Uuid,
    pub name: String,
    pub code: String,
    pub display_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
pub(crate) fn sample_host() -> Host {
    let now = Utc::now();
    Host {
        id: Uuid::nil(),
        email: "host@example.com".to_string(),
        email_verified: true,
        display_name: Some("Old Town Apartments".to_string()),
        business_profile: "company".to_string(),
        timezone: "Europe/Warsaw".to_string(),
        issuer_name: Some("Old Town Apartments sp. z o.o.".to_string()),
        issuer_address: Some("Rynek 1, 31-042 Krakow".to_string()),
        issuer_tax_id: Some("6762463423".to_string()),
        issuer_vat_eu: None,
        issuer_email: Some("billing@oldtown.example".to_string()),
        issuer_phone: None,
        issuer_bank_name: None,
        issuer_bank_account: None,
        numbering_pattern: serde_json::json!([
            {"type": "fixed", "value": "INV"},
            {"type": "delimiter", "value": "/"},
            {"type": "year"},
            {"type": "delimiter", "value": "/"},
            {"type": "rolling", "format": "000"}
        ]),
        rolling_number_current: 0,
        payment_days_due: 14,
        payment_instructions: None,
        default_service_name: "Apartment Rental".to_string(),
        default_vat_rate: 8.0,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
pub(crate) fn sample_reservation() -> Reservation {
    let now = Utc::now();
    Reservation {
        id: Uuid::nil(),
        host_id: Uuid::nil(),
        reservation_number: "DEMO-003".to_string(),
        room_number: 3,
        apartment_code: "123456#".to_string(),
        checkin_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap_or_default(),
        checkout_date: NaiveDate::from_ymd_opt(2025, 3, 4).unwrap_or_default(),
        invoice_type: Some("business".to_string()),
        first_name: None,
        last_name: None,
        company_name: Some("Tech Solutions sp. z o.o.".to_string()),
        tax_id: Some("1234567890".to_string()),
        vat_eu: Some("PL1234567890".to_string()),
        address: Some("ul. Nowy Swiat 50, 00-002 Warszawa".to_string()),
        email: Some("invoices@techsolutions.pl".to_string()),
        special_requests: None,
        service_name: Some("Apartment Rental".to_string()),
        amount_paid: Some(1200.0),
        vat_rate: Some(8.0),
        vat_amount: Some(88.89),
        invoice_number: Some("INV/2025/001".to_string()),
        invoice_generated_at: Some(now),
        guest_submitted_at: Some(now),
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::sample_reservation;

    #[test]
    fn display_name_follows_invoice_type() {
        let mut reservation = sample_reservation();
        assert_eq!(
            reservation.display_name().as_deref(),
            Some("Tech Solutions sp. z o.o.")
        );

        reservation.invoice_type = Some("individual".to_string());
        reservation.first_name = Some("Anna".to_string());
        reservation.last_name = Some("Kowalska".to_string());
        assert_eq!(reservation.display_name().as_deref(), Some("Anna Kowalska"));

        reservation.invoice_type = None;
        assert!(reservation.display_name().is_none());
    }
}
