use crate::config::ConfigError;
use crate::telemetry::TelemetryError;

/// Failures that stop the binary: startup problems, or a marketplace call made outside
/// the HTTP surface.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("marketplace error: {0}")]
    Service(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl AppError {
    pub fn service<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Service(Box::new(err))
    }
}
