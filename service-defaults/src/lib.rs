//! Common defaults for HTTP services: resilient outbound HTTP with service
//! discovery, OpenTelemetry logs, metrics and traces, health probes and
//! layered configuration.
//!
//! ```no_run
//! use service_defaults::{assembly_identity, HostBuilder, StartupFlags};
//!
//! # async fn run() -> Result<(), service_defaults::ServiceDefaultsError> {
//! let builder = HostBuilder::new()?;
//! let flags = StartupFlags::from_environment(assembly_identity!(), builder.environment());
//! builder
//!     .add_service_defaults(&flags)?
//!     .build()?
//!     .map_default_health_check_endpoints()
//!     .run()
//!     .await
//! # }
//! ```

mod application;
pub mod configuration;
mod defaults;
pub mod discovery;
mod endpoints;
pub mod error;
mod flags;
mod host;
pub mod hosting;
pub mod http_client;
mod propagation;
mod settings;
pub mod shutdown;
pub mod telemetry;

pub use application::WebApplication;
pub use configuration::{ConfigSource, Configuration, ConfigurationBuilder};
pub use defaults::SELF_CHECK;
pub use discovery::ServiceEndpointResolver;
pub use endpoints::{ALIVE_PATH, HEALTH_PATH};
pub use error::{HttpClientError, ServiceDefaultsError};
pub use flags::{AssemblyIdentity, StartupFlags};
pub use host::{HostBuilder, HostEnvironment};
pub use http_client::{
    HttpClientDefaults, HttpClientFactory, ResiliencePolicy, RetryPolicy, ServiceClient,
};
pub use settings::HostSettings;
pub use telemetry::{TelemetryGuard, TelemetryOptions};

pub use health;
