use axum::http::{header::AUTHORIZATION, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    state::AppState,
};

pub const DEV_HOST_HEADER: &str = "x-host-id";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostClaims {
    pub sub: String,
    pub exp: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Resolves the calling host id from the bearer token, or from the
/// `x-host-id` header when dev overrides are enabled.
pub async fn require_host_id(state: &AppState, headers: &HeaderMap) -> AppResult<Uuid> {
    resolve_host_id(&state.config, headers)
}

fn resolve_host_id(config: &AppConfig, headers: &HeaderMap) -> AppResult<Uuid> {
    if let Some(token) = bearer_token(headers) {
        let claims = verify_token(config, &token)?;
        return parse_host_id(&claims.sub);
    }

    if config.auth_dev_overrides_enabled() {
        if let Some(raw) = headers
            .get(DEV_HOST_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            tracing::debug!(host_id = raw, "Using dev auth override");
            return parse_host_id(raw);
        }
    }

    Err(AppError::Unauthorized(
        "Unauthorized: missing bearer token.".to_string(),
    ))
}

fn verify_token(config: &AppConfig, token: &str) -> AppResult<HostClaims> {
    let Some(secret) = config.auth_jwt_secret.as_deref() else {
        return Err(AppError::Unauthorized(
            "Unauthorized: token verification is not configured.".to_string(),
        ));
    };

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_aud = false;
    if let Some(issuer) = config.auth_jwt_issuer.as_deref() {
        validation.set_issuer(&[issuer]);
    }

    decode::<HostClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|error| {
        tracing::warn!(error = %error, "Rejected bearer token");
        AppError::Unauthorized("Unauthorized: invalid or expired token.".to_string())
    })
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = raw.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

fn parse_host_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::Unauthorized("Unauthorized: invalid host id.".to_string()))
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, HeaderValue};
    use jsonwebtoken::{encode, EncodingKey, Header};

    use super::{bearer_token, resolve_host_id, HostClaims, DEV_HOST_HEADER};
    use crate::{config::test_config, error::AppError};

    const HOST_ID: &str = "550e8400-e29b-41d4-a716-446655440000";

    fn signed(secret: &str, sub: &str, exp: usize) -> String {
        let claims = HostClaims {
            sub: sub.to_string(),
            exp,
            iss: None,
            email: None,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("token encodes")
    }

    fn far_future() -> usize {
        (chrono::Utc::now().timestamp() + 3600) as usize
    }

    fn with_bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).expect("header"),
        );
        headers
    }

    #[test]
    fn extracts_bearer_token() {
        let headers = with_bearer("abc");
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc"));

        let mut basic = HeaderMap::new();
        basic.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&basic).is_none());
    }

    #[test]
    fn accepts_valid_token() {
        let mut config = test_config();
        config.auth_jwt_secret = Some("secret".to_string());
        let headers = with_bearer(&signed("secret", HOST_ID, far_future()));
        assert_eq!(resolve_host_id(&config, &headers).expect("valid").to_string(), HOST_ID);
    }

    #[test]
    fn rejects_token_signed_with_other_secret() {
        let mut config = test_config();
        config.auth_jwt_secret = Some("secret".to_string());
        let headers = with_bearer(&signed("other", HOST_ID, far_future()));
        assert!(matches!(
            resolve_host_id(&config, &headers),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn rejects_token_when_no_secret_configured() {
        let config = test_config();
        let headers = with_bearer(&signed("secret", HOST_ID, far_future()));
        assert!(resolve_host_id(&config, &headers).is_err());
    }

    #[test]
    fn dev_override_header_requires_flag() {
        let mut config = test_config();
        let mut headers = HeaderMap::new();
        headers.insert(DEV_HOST_HEADER, HeaderValue::from_static(HOST_ID));
        assert!(resolve_host_id(&config, &headers).is_err());

        config.dev_auth_overrides_enabled = true;
        assert_eq!(resolve_host_id(&config, &headers).expect("override").to_string(), HOST_ID);
    }

    #[test]
    fn rejects_non_uuid_subject() {
        let mut config = test_config();
        config.auth_jwt_secret = Some("secret".to_string());
        let headers = with_bearer(&signed("secret", "host-1", far_future()));
        assert!(resolve_host_id(&config, &headers).is_err());
    }
}
