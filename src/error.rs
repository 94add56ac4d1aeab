use thiserror::Error;

#[derive(Error, Debug)]
pub enum PromLoggerError {
    // Setup errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("metrics registry is already attached to an application")]
    AlreadyAttached,

    // Metrics client errors
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("metrics encoding error: {0}")]
    Encoding(String),
}

pub type Result<T> = std::result::Result<T, PromLoggerError>;
