use axum::{routing::get, Router};

use crate::state::AppState;

pub mod building_codes;
pub mod guest_portal;
pub mod health;
pub mod hosts;
pub mod invoice_settings;
pub mod reservations;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/me", get(hosts::me))
        .merge(reservations::router())
        .merge(building_codes::router())
        .merge(invoice_settings::router())
        .merge(guest_portal::router())
}
