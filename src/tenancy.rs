use uuid::Uuid;

use crate::{
    db::{db_pool, map_db_error},
    error::{AppError, AppResult},
    models::Host,
    repository::tenant_store::get_host,
    state::AppState,
};

pub fn assert_host_active(host: &Host) -> AppResult<()> {
    if host.email_verified {
        return Ok(());
    }
    Err(AppError::Forbidden(
        "Forbidden: verify your email address before managing reservations.".to_string(),
    ))
}

/// Loads the authenticated host and checks it may use the admin surface.
pub async fn require_active_host(state: &AppState, host_id: Uuid) -> AppResult<Host> {
    let pool = db_pool(state)?;
    let host = get_host(pool, host_id)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| AppError::NotFound("Host not found.".to_string()))?;
    assert_host_active(&host)?;
    Ok(host)
}

/// Host behind a public guest link. Unverified hosts are indistinguishable
/// from unknown ones.
pub async fn require_public_host(state: &AppState, host_id: Uuid) -> AppResult<Host> {
    let pool = db_pool(state)?;
    get_host(pool, host_id)
        .await
        .map_err(map_db_error)?
        .filter(|host| host.email_verified)
        .ok_or_else(|| AppError::NotFound("Host not found.".to_string()))
}

#[cfg(test)]
mod tests {
    use super::assert_host_active;
    use crate::{
        error::AppError,
        models::{sample_host, Host},
    };

    fn host(verified: bool) -> Host {
        Host {
            email_verified: verified,
            ..sample_host()
        }
    }

    #[test]
    fn unverified_hosts_are_forbidden() {
        assert!(assert_host_active(&host(true)).is_ok());
        assert!(matches!(
            assert_host_active(&host(false)),
            Err(AppError::Forbidden(_))
        ));
    }
}
