use std::{env, fmt, net::SocketAddr, num::ParseIntError};

use super::{database_url, server_bind_address};

pub const DEFAULT_AUDIT_IP: &str = "127.0.0.1";
pub const DEFAULT_AUDIT_USER_AGENT: &str = "farmhand-desktop";
pub const DEFAULT_ACTIVITY_LIMIT: u32 = 10;

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Values recorded on audit rows when the request does not carry its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditDefaults {
    pub ip_address: String,
    pub user_agent: String,
}

impl Default for AuditDefaults {
    fn default() -> Self {
        Self {
            ip_address: DEFAULT_AUDIT_IP.to_string(),
            user_agent: DEFAULT_AUDIT_USER_AGENT.to_string(),
        }
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    pub audit: AuditDefaults,
    pub dashboard_activity_limit: u32,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;

        let defaults = AuditDefaults::default();
        let audit = AuditDefaults {
            ip_address: non_empty_var("AUDIT_DEFAULT_IP").unwrap_or(defaults.ip_address),
            user_agent: non_empty_var("AUDIT_DEFAULT_USER_AGENT")
                .unwrap_or(defaults.user_agent),
        };

        let dashboard_activity_limit = match non_empty_var("DASHBOARD_ACTIVITY_LIMIT") {
            Some(raw) => parse_activity_limit(&raw)?,
            None => DEFAULT_ACTIVITY_LIMIT,
        };

        Ok(Self {
            bind_addr,
            environment,
            database_url: database_url(),
            audit,
            dashboard_activity_limit,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_activity_limit(raw: &str) -> Result<u32, ConfigError> {
    let limit: u32 = raw
        .trim()
        .parse()
        .map_err(|err| ConfigError::ActivityLimit(raw.to_string(), err))?;
    if limit == 0 {
        return Err(ConfigError::ZeroActivityLimit);
    }
    Ok(limit)
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    ActivityLimit(String, ParseIntError),
    ZeroActivityLimit,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::ActivityLimit(value, err) => {
                write!(f, "invalid DASHBOARD_ACTIVITY_LIMIT value {value:?}: {err}")
            }
            Self::ZeroActivityLimit => {
                write!(f, "DASHBOARD_ACTIVITY_LIMIT must be greater than zero")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
