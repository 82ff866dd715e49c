use chrono::{DateTime, NaiveDate, Utc};

use crate::models::Reservation;

const HEADERS: &[&str] = &[
    "ID",
    "Reservation Number",
    "Room",
    "Apartment Code",
    "Check-in",
    "Check-out",
    "Invoice Type",
    "First Name",
    "Last Name",
    "Company Name",
    "Tax ID",
    "VAT EU",
    "Address",
    "Email",
    "Special Requests",
    "Service Name",
    "Amount Paid",
    "VAT Rate",
    "VAT Amount",
    "Invoice Number",
    "Invoice Generated",
    "Guest Submitted",
    "Created",
    "Updated",
];

pub fn export_filename(today: NaiveDate) -> String {
    format!("reservations_{}.csv", today.format("%Y%m%d"))
}

pub fn build_reservations_csv(reservations: &[Reservation]) -> String {
    let mut lines = Vec::with_capacity(reservations.len() + 1);
    lines.push(
        HEADERS
            .iter()
            .map(|header| escape_csv_field(header))
            .collect::<Vec<_>>()
            .join(","),
    );

    for r in reservations {
        let fields = [
            r.id.to_string(),
            r.reservation_number.clone(),
            r.room_number.to_string(),
            r.apartment_code.clone(),
            r.checkin_date.to_string(),
            r.checkout_date.to_string(),
            text(&r.invoice_type),
            text(&r.first_name),
            text(&r.last_name),
            text(&r.company_name),
            text(&r.tax_id),
            text(&r.vat_eu),
            text(&r.address),
            text(&r.email),
            text(&r.special_requests),
            text(&r.service_name),
            number(r.amount_paid),
            number(r.vat_rate),
            number(r.vat_amount),
            text(&r.invoice_number),
            timestamp(r.invoice_generated_at),
            timestamp(r.guest_submitted_at),
            r.created_at.to_rfc3339(),
            r.updated_at.to_rfc3339(),
        ];
        lines.push(
            fields
                .iter()
                .map(|field| escape_csv_field(field))
                .collect::<Vec<_>>()
                .join(","),
        );
    }

    let mut out = lines.join("\r\n");
    out.push_str("\r\n");
    out
}

/// Quotes a field when it contains a delimiter, quote or line break.
pub fn escape_csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn number(value: Option<f64>) -> String {
    value.map(|item| item.to_string()).unwrap_or_default()
}

fn timestamp(value: Option<DateTime<Utc>>) -> String {
    value.map(|item| item.to_rfc3339()).unwrap_or_default()
}
