//! The service defaults: one call wiring resilient HTTP clients, service
//! discovery, OpenTelemetry, the liveness check and layered configuration
//! into a host.

use health::{HealthCheckResult, LIVE_TAG};
use tracing::debug;

use crate::error::ServiceDefaultsError;
use crate::flags::{AssemblyIdentity, StartupFlags};
use crate::host::HostBuilder;
use crate::http_client::ResiliencePolicy;
use crate::telemetry::{
    Instrumentation, LoggingOptions, OtlpExporter, ResourceDescriptor, SamplerChoice, Signal,
    BUILT_IN_METERS,
};

pub const SELF_CHECK: &str = "self";

const BASE_SETTINGS_FILE: &str = "appsettings.json";

impl HostBuilder {
    /// Adds the common service defaults. Fails without an executing assembly
    /// identity, in which case nothing is applied. Every step is idempotent,
    /// so adding the defaults twice is the same as adding them once.
    pub fn add_service_defaults(self, flags: &StartupFlags) -> Result<Self, ServiceDefaultsError> {
        let assembly = flags
            .executing_assembly
            .as_ref()
            .ok_or(ServiceDefaultsError::MissingAssemblyIdentity)?;

        let builder = self
            .configure_http_client_defaults(|defaults| {
                defaults.resilience = Some(ResiliencePolicy::standard());
                defaults.use_service_discovery = true;
            })
            .add_http_client_factory()
            .configure_open_telemetry(assembly, flags.is_development)
            .add_open_telemetry_exporters(flags.use_otlp_exporter)
            .add_default_health_checks()
            .add_service_discovery()
            .add_default_configuration_sources();

        debug!(
            service = %assembly.name,
            environment = builder.environment().name(),
            otlp = flags.use_otlp_exporter,
            "service defaults added"
        );
        Ok(builder)
    }

    fn configure_open_telemetry(self, assembly: &AssemblyIdentity, is_development: bool) -> Self {
        let source = format!("{}*", assembly.namespace());

        self.configure_telemetry(|environment, telemetry| {
            telemetry.logging = Some(LoggingOptions {
                include_formatted_message: true,
                include_scopes: true,
                ..LoggingOptions::default()
            });
            telemetry.resource = Some(ResourceDescriptor::new(assembly, environment.name()));

            telemetry.metrics.runtime_instrumentation = true;
            for meter in BUILT_IN_METERS {
                telemetry.metrics.add_meter(meter);
            }

            if is_development {
                // See all traces in development
                telemetry.tracing.sampler = Some(SamplerChoice::AlwaysOn);
            }
            telemetry
                .tracing
                .add_source(source)
                .add_instrumentation(Instrumentation::InboundHttp)
                .add_instrumentation(Instrumentation::OutboundRpc)
                .add_instrumentation(Instrumentation::OutboundHttp);
        })
    }

    fn add_open_telemetry_exporters(self, use_otlp_exporter: bool) -> Self {
        if !use_otlp_exporter {
            return self;
        }

        self.configure_telemetry(|_, telemetry| {
            for signal in [Signal::Logs, Signal::Metrics, Signal::Traces] {
                telemetry.exporters.attach(signal, OtlpExporter::default());
            }
        })
    }

    fn add_default_health_checks(self) -> Self {
        self.configure_health_checks(|_, health_checks| {
            health_checks.add_check(SELF_CHECK, [LIVE_TAG], HealthCheckResult::healthy);
        })
    }

    fn add_default_configuration_sources(self) -> Self {
        self.configure_app_configuration(|environment, configuration| {
            configuration
                .add_json_file(BASE_SETTINGS_FILE, false)
                .add_json_file(format!("appsettings.{}.json", environment.name()), true)
                .add_environment_variables(None);
        })
    }
}
