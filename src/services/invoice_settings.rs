use chrono_tz::Tz;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::{
    db::map_db_error,
    error::{AppError, AppResult},
    models::Host,
    repository::{
        table_service::update_row,
        tenant_store::{get_host, get_host_for_update},
    },
    schemas::{remove_nulls, serialize_to_map, InvoiceSettingsInput},
    services::invoice_numbering::{rolling_component_count, validate_pattern, MAX_ROLLING_NUMBER},
};

pub fn settings_view(host: &Host) -> Value {
    json!({
        "host_id": host.id,
        "display_name": host.display_name,
        "timezone": host.timezone,
        "issuer_name": host.issuer_name,
        "issuer_address": host.issuer_address,
        "issuer_tax_id": host.issuer_tax_id,
        "issuer_vat_eu": host.issuer_vat_eu,
        "issuer_email": host.issuer_email,
        "issuer_phone": host.issuer_phone,
        "issuer_bank_name": host.issuer_bank_name,
        "issuer_bank_account": host.issuer_bank_account,
        "numbering_pattern": host.numbering_pattern,
        "rolling_number_current": host.rolling_number_current,
        "payment_days_due": host.payment_days_due,
        "payment_instructions": host.payment_instructions,
        "default_service_name": host.default_service_name,
        "default_vat_rate": host.default_vat_rate,
        "updated_at": host.updated_at,
    })
}

/// Turns a settings request into the column patch for `hosts`, rejecting
/// malformed patterns, unknown timezones and a rolling counter moved backwards.
pub fn build_settings_patch(
    current: &Host,
    input: &InvoiceSettingsInput,
) -> AppResult<Map<String, Value>> {
    if let Some(pattern) = &input.numbering_pattern {
        let components = validate_pattern(pattern).map_err(AppError::UnprocessableEntity)?;
        let rolling = rolling_component_count(&components);
        if rolling > 1 {
            tracing::warn!(
                host_id = %current.id,
                rolling_components = rolling,
                "Numbering pattern has several rolling components; all share one counter"
            );
        }
    }

    if let Some(timezone) = &input.timezone {
        if timezone.trim().parse::<Tz>().is_err() {
            return Err(AppError::UnprocessableEntity(format!(
                "Unknown timezone '{}'.",
                timezone.trim()
            )));
        }
    }

    if let Some(next) = input.rolling_number_current {
        if next > MAX_ROLLING_NUMBER {
            return Err(AppError::UnprocessableEntity(format!(
                "Rolling number cannot exceed {MAX_ROLLING_NUMBER}."
            )));
        }
        if next < current.rolling_number_current {
            return Err(AppError::Conflict(format!(
                "Rolling number cannot go back from {} to {next}.",
                current.rolling_number_current
            )));
        }
    }

    let mut patch = remove_nulls(serialize_to_map(input));
    if let Some(Value::String(timezone)) = patch.get_mut("timezone") {
        *timezone = timezone.trim().to_string();
    }
    Ok(patch)
}

pub async fn update_invoice_settings(
    pool: &sqlx::PgPool,
    host_id: Uuid,
    input: &InvoiceSettingsInput,
) -> AppResult<Host> {
    let mut tx = pool.begin().await.map_err(map_db_error)?;

    let current = get_host_for_update(&mut *tx, host_id)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| AppError::NotFound("Host not found.".to_string()))?;
    let patch = build_settings_patch(&current, input)?;
    if patch.is_empty() {
        return Ok(current);
    }

    update_row(&mut *tx, "hosts", host_id, host_id, &patch).await?;
    let updated = get_host(&mut *tx, host_id)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| AppError::NotFound("Host not found.".to_string()))?;
    tx.commit().await.map_err(map_db_error)?;

    tracing::info!(
        host_id = %host_id,
        fields = ?patch.keys().collect::<Vec<_>>(),
        "Invoice settings updated"
    );
    Ok(updated)
}
