use axum::{
    extract::{Request, State},
    http::header::HOST,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{error::AppError, state::AppState};

/// Rejects requests whose `Host` header is not in `TRUSTED_HOSTS`.
/// An entry of `*` disables the check.
pub async fn enforce_trusted_hosts(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let host = request
        .headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if is_trusted_host(&state.config.trusted_hosts, host) {
        return next.run(request).await;
    }

    tracing::warn!(host = host, "Rejected request for untrusted host");
    AppError::BadRequest("Invalid host header.".to_string()).into_response()
}

fn is_trusted_host(trusted: &[String], raw_host: &str) -> bool {
    if trusted.iter().any(|entry| entry.trim() == "*") {
        return true;
    }
    let host = strip_port(raw_host.trim()).to_ascii_lowercase();
    if host.is_empty() {
        return false;
    }
    trusted.iter().any(|entry| {
        let entry = entry.trim().to_ascii_lowercase();
        match entry.strip_prefix("*.") {
            Some(domain) => host.ends_with(&format!(".{domain}")),
            None => host == entry,
        }
    })
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return host
            .split_once(']')
            .map(|(address, _)| address.trim_start_matches('['))
            .unwrap_or(host);
    }
    host.rsplit_once(':')
        .filter(|(_, port)| port.chars().all(|c| c.is_ascii_digit()))
        .map(|(name, _)| name)
        .unwrap_or(host)
}

#[cfg(test)]
mod tests {
    use super::{is_trusted_host, strip_port};

    fn trusted(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|entry| entry.to_string()).collect()
    }

    #[test]
    fn matches_exact_and_wildcard_hosts() {
        let hosts = trusted(&["localhost", "*.guestdesk.app"]);
        assert!(is_trusted_host(&hosts, "localhost:8000"));
        assert!(is_trusted_host(&hosts, "api.guestdesk.app"));
        assert!(!is_trusted_host(&hosts, "guestdesk.app.evil.com"));
        assert!(!is_trusted_host(&hosts, ""));
        assert!(is_trusted_host(&trusted(&["*"]), "anything"));
    }

    #[test]
    fn strips_ports() {
        assert_eq!(strip_port("example.com:443"), "example.com");
        assert_eq!(strip_port("[::1]:8000"), "::1");
        assert_eq!(strip_port("example.com"), "example.com");
    }
}
