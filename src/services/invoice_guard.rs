use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{repository::tenant_store::invoice_number_taken, services::invoice_errors::InvoiceError};

/// Whether no other reservation of `host_id` holds `invoice_number`.
/// Other hosts may use the same number.
pub async fn is_invoice_number_unique<'e, E>(
    executor: E,
    host_id: Uuid,
    invoice_number: &str,
    exclude_reservation_id: Option<Uuid>,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let taken =
        invoice_number_taken(executor, host_id, invoice_number, exclude_reservation_id).await?;
    Ok(!taken)
}

/// Fails with [`InvoiceError::DuplicateInvoiceNumber`] when the number is taken.
pub async fn ensure_invoice_number_available<'e, E>(
    executor: E,
    host_id: Uuid,
    invoice_number: &str,
    exclude_reservation_id: Option<Uuid>,
) -> Result<(), InvoiceError>
where
    E: Executor<'e, Database = Postgres>,
{
    if is_invoice_number_unique(executor, host_id, invoice_number, exclude_reservation_id).await? {
        return Ok(());
    }
    tracing::warn!(
        host_id = %host_id,
        invoice_number = invoice_number,
        "Rejected duplicate invoice number"
    );
    Err(InvoiceError::DuplicateInvoiceNumber(
        invoice_number.to_string(),
    ))
}
