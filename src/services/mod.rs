pub mod access_codes;
pub mod csv_export;
pub mod guest_submission;
pub mod guest_window;
pub mod invoice_corrections;
pub mod invoice_errors;
pub mod invoice_generation;
pub mod invoice_guard;
pub mod invoice_numbering;
pub mod invoice_settings;
