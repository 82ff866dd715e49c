use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub environment: String,
    pub api_prefix: String,
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub trusted_hosts: Vec<String>,
    pub dev_auth_overrides_enabled: bool,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst_size: u32,
    pub request_timeout_seconds: u64,
    pub database_url: Option<String>,
    pub db_pool_max_connections: u32,
    pub db_pool_min_connections: u32,
    pub db_pool_acquire_timeout_seconds: u64,
    pub db_pool_idle_timeout_seconds: u64,
    pub db_run_migrations: bool,
    pub auth_jwt_secret: Option<String>,
    pub auth_jwt_issuer: Option<String>,
    pub default_host_timezone: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("AUTH_JWT_SECRET must be set when ENVIRONMENT is '{0}'")]
    MissingJwtSecret(String),
    #[error("DEFAULT_HOST_TIMEZONE '{0}' is not a known IANA timezone")]
    InvalidTimezone(String),
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            app_name: env_or("APP_NAME", "Guestdesk API"),
            environment: env_or("ENVIRONMENT", "development"),
            api_prefix: normalize_prefix(&env_or("API_PREFIX", "/v1")),
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse_or("PORT", 8000),
            cors_origins: parse_csv(&env_or("CORS_ORIGINS", "http://localhost:3000")),
            trusted_hosts: parse_csv(&env_or("TRUSTED_HOSTS", "localhost,127.0.0.1")),
            dev_auth_overrides_enabled: env_parse_bool_or("DEV_AUTH_OVERRIDES_ENABLED", false),
            rate_limit_per_second: env_parse_or("RATE_LIMIT_PER_SECOND", 10),
            rate_limit_burst_size: env_parse_or("RATE_LIMIT_BURST_SIZE", 100),
            request_timeout_seconds: env_parse_or("REQUEST_TIMEOUT_SECONDS", 30),
            database_url: env_opt("DATABASE_URL"),
            db_pool_max_connections: env_parse_or("DB_POOL_MAX_CONNECTIONS", 5),
            db_pool_min_connections: env_parse_or("DB_POOL_MIN_CONNECTIONS", 1),
            db_pool_acquire_timeout_seconds: env_parse_or("DB_POOL_ACQUIRE_TIMEOUT_SECONDS", 5),
            db_pool_idle_timeout_seconds: env_parse_or("DB_POOL_IDLE_TIMEOUT_SECONDS", 600),
            db_run_migrations: env_parse_bool_or("DB_RUN_MIGRATIONS", true),
            auth_jwt_secret: env_opt("AUTH_JWT_SECRET"),
            auth_jwt_issuer: env_opt("AUTH_JWT_ISSUER"),
            default_host_timezone: env_or("DEFAULT_HOST_TIMEZONE", "Europe/Warsaw"),
        }
    }

    /// Startup checks. There is no built-in fallback secret: outside
    /// development a signing secret has to be configured explicitly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth_jwt_secret.is_none() && !self.is_development() {
            return Err(ConfigError::MissingJwtSecret(self.environment.clone()));
        }
        if self
            .default_host_timezone
            .parse::<chrono_tz::Tz>()
            .is_err()
        {
            return Err(ConfigError::InvalidTimezone(
                self.default_host_timezone.clone(),
            ));
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment.trim().eq_ignore_ascii_case("production")
    }

    pub fn is_development(&self) -> bool {
        let normalized = self.environment.trim().to_ascii_lowercase();
        matches!(normalized.as_str(), "development" | "dev" | "local" | "test")
    }

    /// Timezone used for hosts whose stored zone does not parse.
    pub fn default_timezone(&self) -> chrono_tz::Tz {
        self.default_host_timezone
            .parse()
            .unwrap_or(chrono_tz::Europe::Warsaw)
    }

    pub fn auth_dev_overrides_enabled(&self) -> bool {
        if self.is_production() {
            return false;
        }
        self.dev_auth_overrides_enabled
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    env_opt(key)
        .and_then(|raw| raw.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_parse_bool_or(key: &str, default: bool) -> bool {
    parse_bool(env_opt(key).as_deref()).unwrap_or(default)
}

fn parse_bool(raw: Option<&str>) -> Option<bool> {
    match raw.map(str::to_ascii_lowercase) {
        Some(value) if value == "1" || value == "true" || value == "yes" || value == "on" => {
            Some(true)
        }
        Some(value) if value == "0" || value == "false" || value == "no" || value == "off" => {
            Some(false)
        }
        _ => None,
    }
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn normalize_prefix(raw: &str) -> String {
    let mut prefix = raw.trim().to_string();
    if prefix.is_empty() {
        return "/v1".to_string();
    }
    if !prefix.starts_with('/') {
        prefix.insert(0, '/');
    }
    while prefix.ends_with('/') && prefix.len() > 1 {
        prefix.pop();
    }
    prefix
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        app_name: "Guestdesk API".to_string(),
        environment: "development".to_string(),
        api_prefix: "/v1".to_string(),
        host: "127.0.0.1".to_string(),
        port: 8000,
        cors_origins: vec!["http://localhost:3000".to_string()],
        trusted_hosts: vec!["localhost".to_string(), "127.0.0.1".to_string()],
        dev_auth_overrides_enabled: false,
        rate_limit_per_second: 10,
        rate_limit_burst_size: 100,
        request_timeout_seconds: 30,
        database_url: None,
        db_pool_max_connections: 5,
        db_pool_min_connections: 1,
        db_pool_acquire_timeout_seconds: 5,
        db_pool_idle_timeout_seconds: 600,
        db_run_migrations: false,
        auth_jwt_secret: None,
        auth_jwt_issuer: None,
        default_host_timezone: "Europe/Warsaw".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_prefix, parse_bool, parse_csv, test_config, ConfigError};

    #[test]
    fn normalizes_prefix() {
        assert_eq!(normalize_prefix("v1"), "/v1");
        assert_eq!(normalize_prefix("/v1/"), "/v1");
        assert_eq!(normalize_prefix(""), "/v1");
    }

    #[test]
    fn parses_csv_and_bools() {
        assert_eq!(parse_csv(" a, ,b "), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(parse_bool(Some("ON")), Some(true));
        assert_eq!(parse_bool(Some("0")), Some(false));
        assert_eq!(parse_bool(Some("maybe")), None);
        assert_eq!(parse_bool(None), None);
    }

    #[test]
    fn production_requires_jwt_secret() {
        let mut config = test_config();
        assert!(config.validate().is_ok());

        config.environment = "production".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingJwtSecret("production".to_string()))
        );

        config.auth_jwt_secret = Some("s3cret".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn staging_without_secret_is_rejected() {
        let mut config = test_config();
        config.environment = "staging".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn dev_overrides_never_apply_in_production() {
        let mut config = test_config();
        config.dev_auth_overrides_enabled = true;
        assert!(config.auth_dev_overrides_enabled());
        config.environment = "production".to_string();
        assert!(!config.auth_dev_overrides_enabled());
    }

    #[test]
    fn rejects_unknown_timezone() {
        let mut config = test_config();
        config.default_host_timezone = "Mars/Olympus".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidTimezone("Mars/Olympus".to_string()))
        );
    }

    #[test]
    fn default_timezone_falls_back_to_warsaw() {
        let mut config = test_config();
        config.default_host_timezone = "Europe/Berlin".to_string();
        assert_eq!(config.default_timezone(), chrono_tz::Europe::Berlin);
        config.default_host_timezone = "nowhere".to_string();
        assert_eq!(config.default_timezone(), chrono_tz::Europe::Warsaw);
    }
}
