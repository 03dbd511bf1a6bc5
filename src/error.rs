use std::string::FromUtf8Error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("replicas must be at least 1, got {0}")]
    InvalidReplicas(usize),
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
    #[error("metrics output is not utf-8")]
    MetricsEncoding(#[from] FromUtf8Error),
}

pub type Result<T> = std::result::Result<T, Error>;
