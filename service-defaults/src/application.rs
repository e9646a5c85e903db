use std::future::Future;

use axum::routing::MethodRouter;
use axum::Router;
use health::HealthCheckService;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

use crate::configuration::Configuration;
use crate::error::ServiceDefaultsError;
use crate::host::HostEnvironment;
use crate::hosting::{track_requests, ClientAddr, InboundSpan};
use crate::http_client::HttpClientFactory;
use crate::settings::HostSettings;
use crate::shutdown::graceful_shutdown;
use crate::telemetry::{Instrumentation, TelemetryOptions};

/// A built host: configuration is loaded and health checks are frozen. Routes
/// are added here before the application is served.
pub struct WebApplication {
    settings: HostSettings,
    environment: HostEnvironment,
    configuration: Configuration,
    telemetry: TelemetryOptions,
    health_checks: HealthCheckService,
    http_clients: Option<HttpClientFactory>,
    router: Router,
    pub(crate) health_endpoints_mapped: bool,
}

impl WebApplication {
    pub(crate) fn new(
        settings: HostSettings,
        environment: HostEnvironment,
        configuration: Configuration,
        telemetry: TelemetryOptions,
        health_checks: HealthCheckService,
        http_clients: Option<HttpClientFactory>,
    ) -> Self {
        Self {
            settings,
            environment,
            configuration,
            telemetry,
            health_checks,
            http_clients,
            router: Router::new(),
            health_endpoints_mapped: false,
        }
    }

    pub fn settings(&self) -> &HostSettings {
        &self.settings
    }

    pub fn environment(&self) -> &HostEnvironment {
        &self.environment
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn telemetry(&self) -> &TelemetryOptions {
        &self.telemetry
    }

    pub fn health_checks(&self) -> &HealthCheckService {
        &self.health_checks
    }

    /// `None` unless the HTTP client factory was registered on the builder.
    pub fn http_clients(&self) -> Option<&HttpClientFactory> {
        self.http_clients.as_ref()
    }

    pub fn route(mut self, path: &str, method_router: MethodRouter) -> Self {
        self.router = self.router.route(path, method_router);
        self
    }

    pub fn merge(mut self, router: Router) -> Self {
        self.router = self.router.merge(router);
        self
    }

    /// The application routes wrapped in the hosting middleware, and in the
    /// inbound HTTP trace layer when that instrumentation is enabled.
    pub fn into_router(self) -> Router {
        let router = self
            .router
            .layer(axum::middleware::from_fn(track_requests));

        match self
            .telemetry
            .tracing
            .has_instrumentation(Instrumentation::InboundHttp)
        {
            true => router.layer(
                TraceLayer::new_for_http()
                    .make_span_with(InboundSpan)
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            ),
            false => router,
        }
    }

    /// Serves until SIGTERM or SIGINT.
    pub async fn run(self) -> Result<(), ServiceDefaultsError> {
        self.run_until(graceful_shutdown()).await
    }

    /// Installs telemetry and serves on the configured address until `signal`
    /// completes. Telemetry is flushed when the server has drained.
    pub async fn run_until<F>(self, signal: F) -> Result<(), ServiceDefaultsError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut telemetry = self.telemetry.clone();
        telemetry.apply_configuration(&self.configuration);
        let _telemetry = telemetry.install()?;

        let bind = self.settings.bind();
        let listener = tokio::net::TcpListener::bind(&bind).await?;
        info!(
            address = %bind,
            environment = self.environment.name(),
            "listening"
        );

        let router = self.into_router();
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<ClientAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await?;

        info!("server stopped");
        Ok(())
    }
}
