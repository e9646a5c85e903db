use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::telemetry::Signal;

/// Errors raised while composing, building or running a host.
#[derive(Error, Debug)]
pub enum ServiceDefaultsError {
    #[error("the executing assembly identity is required to add service defaults")]
    MissingAssemblyIdentity,
    #[error("invalid host settings: {0}")]
    Settings(#[from] envconfig::Error),
    #[error("required configuration file {} was not found", .0.display())]
    MissingConfigFile(PathBuf),
    #[error("invalid configuration")]
    Configuration(#[source] Box<figment::Error>),
    #[error("failed to build the {signal} exporter: {reason}")]
    Telemetry { signal: Signal, reason: String },
    #[error("failed to initialise tracing")]
    Tracing(#[from] tracing_subscriber::util::TryInitError),
    #[error(transparent)]
    HttpClient(#[from] HttpClientError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ServiceDefaultsError {
    fn from(err: figment::Error) -> Self {
        ServiceDefaultsError::Configuration(Box::new(err))
    }
}

/// Enumeration of errors returned by clients created through the `HttpClientFactory`.
#[derive(Error, Debug)]
pub enum HttpClientError {
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http request timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("no endpoint could be resolved for service {service}")]
    Discovery { service: String },
}
