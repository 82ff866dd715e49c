use std::sync::Arc;

use sqlx::PgPool;

use crate::{config::AppConfig, db};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db_pool: Option<PgPool>,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self, sqlx::Error> {
        let db_pool = db::build_pool(&config)?;
        if db_pool.is_none() {
            tracing::warn!("DATABASE_URL is not set; database-backed routes will return 503");
        }
        Ok(Self {
            config: Arc::new(config),
            db_pool,
        })
    }
}
