pub mod table_service;
pub mod tenant_store;
