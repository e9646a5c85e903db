use std::path::{Path, PathBuf};

use envconfig::Envconfig;
use health::HealthCheckRegistry;

use crate::application::WebApplication;
use crate::configuration::ConfigurationBuilder;
use crate::discovery::ServiceEndpointResolver;
use crate::error::ServiceDefaultsError;
use crate::http_client::{HttpClientDefaults, HttpClientFactory};
use crate::settings::HostSettings;
use crate::telemetry::TelemetryOptions;

const DEVELOPMENT: &str = "Development";

/// The environment the host runs in and where its content lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEnvironment {
    name: String,
    content_root: PathBuf,
}

impl HostEnvironment {
    pub fn new(name: impl Into<String>, content_root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            content_root: content_root.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_root(&self) -> &Path {
        &self.content_root
    }

    /// Environment names compare case-insensitively.
    pub fn is_environment(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn is_development(&self) -> bool {
        self.is_environment(DEVELOPMENT)
    }
}

/// Mutable startup state of a web host. Capabilities are registered here and
/// frozen by `build`.
#[derive(Debug)]
pub struct HostBuilder {
    settings: HostSettings,
    environment: HostEnvironment,
    configuration: ConfigurationBuilder,
    telemetry: TelemetryOptions,
    health_checks: HealthCheckRegistry,
    http_client_defaults: HttpClientDefaults,
    http_client_factory: bool,
    service_discovery: bool,
}

impl HostBuilder {
    /// Reads the host settings from the process environment.
    pub fn new() -> Result<Self, ServiceDefaultsError> {
        Ok(Self::with_settings(HostSettings::init_from_env()?))
    }

    pub fn with_settings(settings: HostSettings) -> Self {
        let environment =
            HostEnvironment::new(settings.environment.clone(), settings.content_root.clone());

        Self {
            settings,
            environment,
            configuration: ConfigurationBuilder::new(),
            telemetry: TelemetryOptions::default(),
            health_checks: HealthCheckRegistry::new(),
            http_client_defaults: HttpClientDefaults::default(),
            http_client_factory: false,
            service_discovery: false,
        }
    }

    pub fn settings(&self) -> &HostSettings {
        &self.settings
    }

    pub fn environment(&self) -> &HostEnvironment {
        &self.environment
    }

    pub fn configuration(&self) -> &ConfigurationBuilder {
        &self.configuration
    }

    pub fn telemetry(&self) -> &TelemetryOptions {
        &self.telemetry
    }

    pub fn health_checks(&self) -> &HealthCheckRegistry {
        &self.health_checks
    }

    pub fn health_checks_mut(&mut self) -> &mut HealthCheckRegistry {
        &mut self.health_checks
    }

    pub fn http_client_defaults(&self) -> &HttpClientDefaults {
        &self.http_client_defaults
    }

    pub fn has_http_client_factory(&self) -> bool {
        self.http_client_factory
    }

    pub fn has_service_discovery(&self) -> bool {
        self.service_discovery
    }

    pub fn configure_app_configuration<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(&HostEnvironment, &mut ConfigurationBuilder),
    {
        configure(&self.environment, &mut self.configuration);
        self
    }

    pub fn configure_telemetry<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(&HostEnvironment, &mut TelemetryOptions),
    {
        configure(&self.environment, &mut self.telemetry);
        self
    }

    pub fn configure_health_checks<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(&HostEnvironment, &mut HealthCheckRegistry),
    {
        configure(&self.environment, &mut self.health_checks);
        self
    }

    /// Defaults applied to every client the factory creates.
    pub fn configure_http_client_defaults<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(&mut HttpClientDefaults),
    {
        configure(&mut self.http_client_defaults);
        self
    }

    pub fn add_http_client_factory(mut self) -> Self {
        self.http_client_factory = true;
        self
    }

    /// Resolve logical service names from the `services` configuration section.
    pub fn add_service_discovery(mut self) -> Self {
        self.service_discovery = true;
        self
    }

    /// Loads the configuration sources, freezes the health checks and builds
    /// the registered capabilities. Configuration errors surface here.
    pub fn build(self) -> Result<WebApplication, ServiceDefaultsError> {
        let content_root = if self.environment.content_root.is_absolute() {
            self.environment.content_root.clone()
        } else {
            std::env::current_dir()?.join(&self.environment.content_root)
        };
        let environment = HostEnvironment::new(self.environment.name, content_root);

        let configuration = self.configuration.build(environment.content_root())?;

        let resolver = self
            .service_discovery
            .then(|| ServiceEndpointResolver::new(configuration.clone()));
        let http_clients = self
            .http_client_factory
            .then(|| HttpClientFactory::new(self.http_client_defaults, resolver));

        Ok(WebApplication::new(
            self.settings,
            environment,
            configuration,
            self.telemetry,
            self.health_checks.into_service(),
            http_clients,
        ))
    }
}
