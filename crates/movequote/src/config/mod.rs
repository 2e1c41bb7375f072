use std::env;
use std::net::{IpAddr, SocketAddr};

use crate::marketplace::pricing::MAX_REVEAL_PRICE;
use crate::marketplace::CreditLedger;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub marketplace: MarketplaceConfig,
    pub datastore: DataStoreConfig,
    pub email: EmailConfig,
    pub payments: PaymentConfig,
    pub auth: AuthConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let base_url = env::var("APP_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();
        let welcome_credits = parse_credits("WELCOME_CREDITS", 10)?;
        if welcome_credits > CreditLedger::MAX_ENTRY_CREDITS {
            return Err(ConfigError::InvalidNumber {
                variable: "WELCOME_CREDITS",
            });
        }
        let default_reveal_price = parse_credits("DEFAULT_REVEAL_PRICE", 5)?;
        if !(1..=MAX_REVEAL_PRICE).contains(&default_reveal_price) {
            return Err(ConfigError::InvalidNumber {
                variable: "DEFAULT_REVEAL_PRICE",
            });
        }

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            marketplace: MarketplaceConfig {
                base_url,
                welcome_credits,
                default_reveal_price,
            },
            datastore: DataStoreConfig {
                url: optional("DATASTORE_URL"),
                anon_key: optional("DATASTORE_ANON_KEY"),
                service_key: optional("DATASTORE_SERVICE_KEY"),
            },
            email: EmailConfig {
                api_key: optional("EMAIL_API_KEY"),
                from_address: env::var("EMAIL_FROM")
                    .unwrap_or_else(|_| "no-reply@movequote.local".to_string()),
            },
            payments: PaymentConfig {
                secret_key: optional("PAYMENTS_SECRET_KEY"),
                webhook_secret: optional("PAYMENTS_WEBHOOK_SECRET"),
            },
            auth: AuthConfig {
                admin_token: optional("ADMIN_API_TOKEN"),
            },
        })
    }
}

fn optional(variable: &str) -> Option<String> {
    env::var(variable)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_credits(variable: &'static str, default: i64) -> Result<i64, ConfigError> {
    match env::var(variable) {
        Ok(raw) => {
            let value = raw
                .trim()
                .parse::<i64>()
                .map_err(|_| ConfigError::InvalidNumber { variable })?;
            if value < 0 {
                return Err(ConfigError::InvalidNumber { variable });
            }
            Ok(value)
        }
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Business knobs for credits and outbound links.
#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    pub base_url: String,
    pub welcome_credits: i64,
    pub default_reveal_price: i64,
}

/// Hosted relational store credentials.
#[derive(Debug, Clone, Default)]
pub struct DataStoreConfig {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub service_key: Option<String>,
}

impl DataStoreConfig {
    /// Redacted summary safe for startup logs.
    pub fn describe(&self) -> String {
        match &self.url {
            Some(url) => format!(
                "{url} (anon key: {}, service key: {})",
                presence(&self.anon_key),
                presence(&self.service_key)
            ),
            None => "in-memory".to_string(),
        }
    }
}

fn presence(value: &Option<String>) -> &'static str {
    if value.is_some() {
        "set"
    } else {
        "unset"
    }
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_key: Option<String>,
    pub from_address: String,
}

#[derive(Debug, Clone, Default)]
pub struct PaymentConfig {
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub admin_token: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("APP_PORT must be a valid u16")]
    InvalidPort,
    #[error("APP_HOST must parse to an IPv4 or IPv6 address")]
    InvalidHost {
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("{variable} is not a usable whole number of credits")]
    InvalidNumber { variable: &'static str },
}
