use crate::{db, error::AppError};

/// Failures raised by invoice numbering, generation, correction and the
/// guest edit gate. Route handlers convert these into [`AppError`].
#[derive(Debug, thiserror::Error)]
pub enum InvoiceError {
    #[error("Host not found.")]
    HostNotFound,
    #[error("Reservation not found.")]
    ReservationNotFound,
    #[error("Guest has not submitted invoice details yet.")]
    GuestNotSubmitted,
    #[error("Amount paid is required.")]
    MissingAmount,
    #[error("Amount paid must be a positive number.")]
    InvalidAmount,
    #[error("VAT rate must be a non-negative number.")]
    InvalidVatRate,
    #[error("Numbering pattern does not produce an invoice number.")]
    EmptyInvoiceNumber,
    #[error("Rolling number has reached its maximum of {0}.")]
    CounterExhausted(i64),
    #[error("invoice_type must be 'individual' or 'business'.")]
    InvalidInvoiceType,
    #[error("No invoice to correct.")]
    NoInvoiceToCorrect,
    #[error("Invoice number '{0}' already exists.")]
    DuplicateInvoiceNumber(String),
    #[error("Editing is no longer allowed (less than 1 hour before checkout).")]
    EditWindowClosed,
    #[error("Storage failure: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("Invoice snapshot could not be encoded: {0}")]
    Snapshot(#[from] serde_json::Error),
}

impl From<InvoiceError> for AppError {
    fn from(error: InvoiceError) -> Self {
        match error {
            InvoiceError::HostNotFound | InvoiceError::ReservationNotFound => {
                AppError::NotFound(error.to_string())
            }
            InvoiceError::GuestNotSubmitted
            | InvoiceError::MissingAmount
            | InvoiceError::InvalidAmount
            | InvoiceError::InvalidVatRate
            | InvoiceError::EmptyInvoiceNumber
            | InvoiceError::CounterExhausted(_)
            | InvoiceError::InvalidInvoiceType
            | InvoiceError::NoInvoiceToCorrect => AppError::UnprocessableEntity(error.to_string()),
            InvoiceError::DuplicateInvoiceNumber(_) => AppError::Conflict(error.to_string()),
            InvoiceError::EditWindowClosed => AppError::Forbidden(error.to_string()),
            InvoiceError::Storage(inner) => db::map_db_error(inner),
            InvoiceError::Snapshot(inner) => AppError::Internal(inner.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::InvoiceError;
    use crate::error::AppError;

    fn status(error: InvoiceError) -> StatusCode {
        AppError::from(error).status_code()
    }

    #[test]
    fn maps_onto_error_taxonomy() {
        assert_eq!(status(InvoiceError::HostNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status(InvoiceError::ReservationNotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status(InvoiceError::MissingAmount),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(InvoiceError::GuestNotSubmitted),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(InvoiceError::DuplicateInvoiceNumber("INV/2025/001_CORRECTED".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(status(InvoiceError::EditWindowClosed), StatusCode::FORBIDDEN);
        assert_eq!(
            status(InvoiceError::InvalidInvoiceType),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(InvoiceError::CounterExhausted(999_999_999)),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(InvoiceError::Storage(sqlx::Error::PoolTimedOut)),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn duplicate_message_names_the_number() {
        let message = InvoiceError::DuplicateInvoiceNumber("INV/1".to_string()).to_string();
        assert!(message.contains("INV/1"));
    }
}
