use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    models::Host,
    repository::tenant_store::{advance_rolling_counter, get_host, get_host_for_update},
    services::{guest_window::host_timezone, invoice_errors::InvoiceError},
};

const DEFAULT_ROLLING_FORMAT: &str = "000";

/// Highest value the rolling counter may hold.
pub const MAX_ROLLING_NUMBER: i64 = 999_999_999;

/// One entry of a host's numbering pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternComponent {
    Fixed(String),
    Delimiter(String),
    Year,
    Month,
    Rolling { width: usize },
    /// Unrecognised entries are kept so they round-trip, but render nothing.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedNumber {
    pub invoice_number: String,
    /// Counter value to persist when committing; `None` if the pattern has
    /// no rolling component.
    pub next_counter: Option<i64>,
}

/// Parses the stored pattern. Accepts a JSON array or a string holding one;
/// anything else yields an empty pattern.
pub fn parse_pattern(raw: &Value) -> Vec<PatternComponent> {
    let parsed;
    let items = match raw {
        Value::Array(items) => items,
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Array(items)) => {
                parsed = items;
                &parsed
            }
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    items.iter().map(parse_component).collect()
}

fn parse_component(item: &Value) -> PatternComponent {
    let Some(obj) = item.as_object() else {
        return PatternComponent::Unknown;
    };
    let text = |key: &str| {
        obj.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    match obj.get("type").and_then(Value::as_str).map(str::trim) {
        Some("fixed") => PatternComponent::Fixed(text("value")),
        Some("delimiter") => PatternComponent::Delimiter(text("value")),
        Some("year") => PatternComponent::Year,
        Some("month") => PatternComponent::Month,
        Some("rolling") => {
            let format = obj
                .get("format")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_ROLLING_FORMAT);
            PatternComponent::Rolling {
                width: format.chars().count(),
            }
        }
        _ => PatternComponent::Unknown,
    }
}

/// Checks a pattern submitted through settings: a JSON array whose entries
/// are objects with a string `type`. Unknown types pass and render nothing.
pub fn validate_pattern(raw: &Value) -> Result<Vec<PatternComponent>, String> {
    let Value::Array(items) = raw else {
        return Err("Numbering pattern must be a JSON array.".to_string());
    };
    for (index, item) in items.iter().enumerate() {
        let has_type = item
            .as_object()
            .and_then(|obj| obj.get("type"))
            .is_some_and(Value::is_string);
        if !has_type {
            return Err(format!(
                "Numbering pattern entry {index} must be an object with a string 'type'."
            ));
        }
    }
    Ok(items.iter().map(parse_component).collect())
}

pub fn rolling_component_count(pattern: &[PatternComponent]) -> usize {
    pattern
        .iter()
        .filter(|component| matches!(component, PatternComponent::Rolling { .. }))
        .count()
}

/// Renders `pattern` for the given counter and local date.
///
/// Every rolling component renders `counter + 1` from the same stored value,
/// so a pattern with several of them still advances the counter by one.
pub fn render_pattern<D: Datelike>(
    pattern: &[PatternComponent],
    counter: i64,
    today: &D,
) -> RenderedNumber {
    let next = counter.clamp(0, MAX_ROLLING_NUMBER - 1) + 1;
    let mut invoice_number = String::new();
    let mut next_counter = None;

    for component in pattern {
        match component {
            PatternComponent::Fixed(value) | PatternComponent::Delimiter(value) => {
                invoice_number.push_str(value);
            }
            PatternComponent::Year => {
                invoice_number.push_str(&format!("{:04}", today.year()));
            }
            PatternComponent::Month => {
                invoice_number.push_str(&format!("{:02}", today.month()));
            }
            PatternComponent::Rolling { width } => {
                invoice_number.push_str(&format!("{next:0width$}", width = *width));
                next_counter = Some(next);
            }
            PatternComponent::Unknown => {}
        }
    }

    RenderedNumber {
        invoice_number,
        next_counter,
    }
}

fn render_for_host(host: &Host, now: DateTime<Utc>, fallback_tz: Tz) -> RenderedNumber {
    let pattern = parse_pattern(&host.numbering_pattern);
    let today = now
        .with_timezone(&host_timezone(&host.timezone, fallback_tz))
        .date_naive();
    render_pattern(&pattern, host.rolling_number_current, &today)
}

/// Preview mode: computes the next number without touching the counter.
pub async fn preview_next_invoice_number(
    pool: &sqlx::PgPool,
    host_id: Uuid,
    now: DateTime<Utc>,
    fallback_tz: Tz,
) -> Result<Option<String>, InvoiceError> {
    let host = get_host(pool, host_id)
        .await?
        .ok_or(InvoiceError::HostNotFound)?;
    let rendered = render_for_host(&host, now, fallback_tz);
    Ok(Some(rendered.invoice_number).filter(|number| !number.is_empty()))
}

/// Commit mode: locks the host row, renders the number and persists the
/// advanced counter. Must run inside the caller's transaction so the
/// increment rolls back with it.
pub async fn allocate_invoice_number(
    conn: &mut PgConnection,
    host_id: Uuid,
    now: DateTime<Utc>,
    fallback_tz: Tz,
) -> Result<String, InvoiceError> {
    let host = get_host_for_update(&mut *conn, host_id)
        .await?
        .ok_or(InvoiceError::HostNotFound)?;
    if host.rolling_number_current >= MAX_ROLLING_NUMBER {
        return Err(InvoiceError::CounterExhausted(MAX_ROLLING_NUMBER));
    }
    let rendered = render_for_host(&host, now, fallback_tz);
    if rendered.invoice_number.is_empty() {
        return Err(InvoiceError::EmptyInvoiceNumber);
    }

    if let Some(next_counter) = rendered.next_counter {
        advance_rolling_counter(&mut *conn, host_id, next_counter).await?;
    }

    tracing::info!(
        host_id = %host_id,
        invoice_number = %rendered.invoice_number,
        rolling_number = ?rendered.next_counter,
        "Allocated invoice number"
    );
    Ok(rendered.invoice_number)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::{
        parse_pattern, render_pattern, rolling_component_count, validate_pattern,
        PatternComponent, MAX_ROLLING_NUMBER,
    };

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn default_pattern() -> Vec<PatternComponent> {
        parse_pattern(&json!([
            {"type": "fixed", "value": "INV"},
            {"type": "delimiter", "value": "/"},
            {"type": "year"},
            {"type": "delimiter", "value": "/"},
            {"type": "rolling", "format": "000"}
        ]))
    }

    #[test]
    fn parses_all_component_types() {
        let pattern = parse_pattern(&json!([
            {"type": "fixed", "value": "FAK"},
            {"type": "delimiter", "value": "-"},
            {"type": "year"},
            {"type": "month"},
            {"type": "rolling", "format": "00000"},
            {"type": "weekday"},
            "not-an-object"
        ]));
        assert_eq!(
            pattern,
            vec![
                PatternComponent::Fixed("FAK".to_string()),
                PatternComponent::Delimiter("-".to_string()),
                PatternComponent::Year,
                PatternComponent::Month,
                PatternComponent::Rolling { width: 5 },
                PatternComponent::Unknown,
                PatternComponent::Unknown,
            ]
        );
    }

    #[test]
    fn accepts_pattern_stored_as_json_text() {
        let pattern = parse_pattern(&json!("[{\"type\":\"year\"}]"));
        assert_eq!(pattern, vec![PatternComponent::Year]);
        assert!(parse_pattern(&json!("garbage")).is_empty());
        assert!(parse_pattern(&json!({"type": "year"})).is_empty());
    }

    #[test]
    fn rolling_defaults_to_three_digits() {
        let pattern = parse_pattern(&json!([{"type": "rolling"}]));
        assert_eq!(pattern, vec![PatternComponent::Rolling { width: 3 }]);
    }

    #[test]
    fn commit_sequence_produces_consecutive_numbers() {
        let pattern = default_pattern();
        let today = date(2025, 6, 15);

        let mut counter = 0;
        let first = render_pattern(&pattern, counter, &today);
        assert_eq!(first.invoice_number, "INV/2025/001");
        counter = first.next_counter.expect("rolling advances");

        let second = render_pattern(&pattern, counter, &today);
        assert_eq!(second.invoice_number, "INV/2025/002");
        assert_eq!(second.next_counter, Some(2));
    }

    #[test]
    fn preview_is_stable_and_commit_advances_by_one_each_time() {
        let pattern = default_pattern();
        let today = date(2025, 1, 2);
        let stored = 41;

        for _ in 0..5 {
            let preview = render_pattern(&pattern, stored, &today);
            assert_eq!(preview.invoice_number, "INV/2025/042");
        }

        let mut counter = stored;
        for _ in 0..7 {
            counter = render_pattern(&pattern, counter, &today)
                .next_counter
                .expect("rolling advances");
        }
        assert_eq!(counter, stored + 7);
    }

    #[test]
    fn month_is_zero_padded() {
        let pattern = parse_pattern(&json!([
            {"type": "year"},
            {"type": "delimiter", "value": "-"},
            {"type": "month"}
        ]));
        assert_eq!(
            render_pattern(&pattern, 0, &date(2025, 3, 9)).invoice_number,
            "2025-03"
        );
        assert_eq!(
            render_pattern(&pattern, 0, &date(2025, 11, 9)).invoice_number,
            "2025-11"
        );
    }

    #[test]
    fn counter_wider_than_format_is_not_truncated() {
        let pattern = parse_pattern(&json!([{"type": "rolling", "format": "00"}]));
        assert_eq!(
            render_pattern(&pattern, 999, &date(2025, 1, 1)).invoice_number,
            "1000"
        );
    }

    #[test]
    fn pattern_without_rolling_leaves_counter_alone() {
        let pattern = parse_pattern(&json!([{"type": "fixed", "value": "X"}, {"type": "year"}]));
        let rendered = render_pattern(&pattern, 10, &date(2024, 1, 1));
        assert_eq!(rendered.invoice_number, "X2024");
        assert_eq!(rendered.next_counter, None);
    }

    #[test]
    fn unknown_components_render_nothing() {
        let pattern = parse_pattern(&json!([
            {"type": "fixed", "value": "A"},
            {"type": "quarter"},
            {"type": "fixed", "value": "B"}
        ]));
        assert_eq!(render_pattern(&pattern, 0, &date(2025, 1, 1)).invoice_number, "AB");
    }

    #[test]
    fn multiple_rolling_components_share_one_increment() {
        let pattern = parse_pattern(&json!([
            {"type": "rolling", "format": "00"},
            {"type": "delimiter", "value": "."},
            {"type": "rolling", "format": "0000"}
        ]));
        assert_eq!(rolling_component_count(&pattern), 2);
        let rendered = render_pattern(&pattern, 4, &date(2025, 1, 1));
        assert_eq!(rendered.invoice_number, "05.0005");
        assert_eq!(rendered.next_counter, Some(5));
    }

    #[test]
    fn oversized_counter_does_not_overflow() {
        let pattern = parse_pattern(&json!([{"type": "rolling"}]));
        let rendered = render_pattern(&pattern, i64::MAX, &date(2025, 1, 1));
        assert_eq!(rendered.next_counter, Some(MAX_ROLLING_NUMBER));
        assert_eq!(rendered.invoice_number, MAX_ROLLING_NUMBER.to_string());
    }

    #[test]
    fn empty_pattern_renders_empty_string() {
        let rendered = render_pattern(&[], 3, &date(2025, 1, 1));
        assert!(rendered.invoice_number.is_empty());
        assert_eq!(rendered.next_counter, None);
    }

    #[test]
    fn validates_submitted_patterns() {
        let pattern = validate_pattern(&json!([
            {"type": "fixed", "value": "INV"},
            {"type": "quarter"}
        ]))
        .expect("valid");
        assert_eq!(pattern.len(), 2);

        assert!(validate_pattern(&json!({"type": "year"})).is_err());
        assert!(validate_pattern(&json!([{"value": "INV"}])).is_err());
        assert!(validate_pattern(&json!([{"type": 3}])).is_err());
        assert!(validate_pattern(&json!([])).is_ok());
    }

    async fn stored_counter(pool: &sqlx::PgPool, host_id: uuid::Uuid) -> i64 {
        crate::repository::tenant_store::get_host(pool, host_id)
            .await
            .expect("query host")
            .expect("host exists")
            .rolling_number_current
    }

    #[tokio::test]
    #[ignore] // Requires running PostgreSQL
    async fn preview_leaves_counter_and_allocation_advances_it() {
        use chrono::{Datelike, Utc};

        use super::{allocate_invoice_number, preview_next_invoice_number};
        use crate::test_support::{insert_host, test_pool};

        let pool = test_pool().await;
        let host_id = insert_host(&pool, 41).await;
        let now = Utc::now();
        let tz = chrono_tz::Europe::Warsaw;
        let year = now.with_timezone(&tz).year();

        for _ in 0..3 {
            let preview = preview_next_invoice_number(&pool, host_id, now, tz)
                .await
                .expect("preview");
            assert_eq!(preview, Some(format!("INV/{year}/042")));
        }
        assert_eq!(stored_counter(&pool, host_id).await, 41);

        let mut allocated = Vec::new();
        for _ in 0..4 {
            let mut tx = pool.begin().await.expect("begin");
            allocated.push(
                allocate_invoice_number(&mut tx, host_id, now, tz)
                    .await
                    .expect("allocate"),
            );
            tx.commit().await.expect("commit");
        }
        assert_eq!(stored_counter(&pool, host_id).await, 45);
        assert_eq!(allocated[0], format!("INV/{year}/042"));
        assert_eq!(allocated[3], format!("INV/{year}/045"));

        // A rolled-back allocation leaves the counter where it was.
        let mut tx = pool.begin().await.expect("begin");
        allocate_invoice_number(&mut tx, host_id, now, tz)
            .await
            .expect("allocate");
        tx.rollback().await.expect("rollback");
        assert_eq!(stored_counter(&pool, host_id).await, 45);
    }
}
