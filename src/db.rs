use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    state::AppState,
};

/// Builds a lazily-connecting pool so startup does not block on the database.
pub fn build_pool(config: &AppConfig) -> Result<Option<PgPool>, sqlx::Error> {
    let Some(url) = config.database_url.as_deref() else {
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.db_pool_max_connections.max(1))
        .min_connections(
            config
                .db_pool_min_connections
                .min(config.db_pool_max_connections),
        )
        .acquire_timeout(Duration::from_secs(config.db_pool_acquire_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.db_pool_idle_timeout_seconds))
        .connect_lazy(url)?;
    Ok(Some(pool))
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn db_pool(state: &AppState) -> AppResult<&PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}

pub fn map_db_error(error: sqlx::Error) -> AppError {
    if is_unique_violation(&error) {
        tracing::warn!(db_error = %error, "Unique constraint rejected write");
        return AppError::Conflict("Duplicate value violates a unique constraint.".to_string());
    }
    tracing::error!(db_error = %error, "Database query failed");
    AppError::Dependency("Database operation failed.".to_string())
}

pub fn is_unique_violation(error: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_error) = error {
        if db_error.code().as_deref() == Some("23505") {
            return true;
        }
    }
    error
        .to_string()
        .to_ascii_lowercase()
        .contains("duplicate key value violates unique constraint")
}

#[cfg(test)]
mod tests {
    use super::{build_pool, is_unique_violation, map_db_error};
    use crate::{config::test_config, error::AppError};

    #[test]
    fn no_url_means_no_pool() {
        let config = test_config();
        assert!(build_pool(&config).expect("no error").is_none());
    }

    #[test]
    fn row_not_found_is_a_dependency_error() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
        assert!(matches!(
            map_db_error(sqlx::Error::RowNotFound),
            AppError::Dependency(_)
        ));
    }
}
