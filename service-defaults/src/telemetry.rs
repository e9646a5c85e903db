//! Declarative OpenTelemetry setup.
//!
//! The composer only fills in `TelemetryOptions`. Nothing global is touched
//! until `TelemetryOptions::install` runs, which builds the OTLP providers for
//! the attached signals, registers them globally and initializes the tracing
//! subscriber:
//!   - stdout JSON logs with a level configured by the RUST_LOG envvar, falling
//!     back to `Logging:LogLevel:Default` in the configuration (default=INFO)
//!   - OpenTelemetry spans for the configured sources and instrumentations
//!   - OpenTelemetry logs bridged from `tracing` events
//!   - W3C trace context propagation for inbound and outbound HTTP
//!   - OpenTelemetry metrics for the configured meters only

use std::collections::BTreeMap;
use std::fmt;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::{Aggregation, Instrument, SdkMeterProvider, Stream};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use tracing::level_filters::LevelFilter;
use tracing::warn;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::fmt::format::{Format, Json, JsonFields};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::configuration::Configuration;
use crate::error::ServiceDefaultsError;
use crate::flags::AssemblyIdentity;

pub const HOSTING_METER: &str = "service_defaults.hosting";
pub const SERVER_CONNECTIONS_METER: &str = "service_defaults.server.connections";
pub const HTTP_CLIENT_METER: &str = "service_defaults.http_client";
pub const WORKER_METER: &str = "service_defaults.worker";
pub const RUNTIME_METER: &str = "service_defaults.runtime";

/// Meters enabled by the service defaults, in registration order.
pub const BUILT_IN_METERS: [&str; 4] = [
    HOSTING_METER,
    SERVER_CONNECTIONS_METER,
    HTTP_CLIENT_METER,
    WORKER_METER,
];

const TRACER_NAME: &str = "service-defaults";

pub const LOG_LEVEL_KEY: &str = "Logging:LogLevel:Default";

// Exporter internals log through tracing too, bridging them back would loop
const LOG_BRIDGE_EXCLUDED_TARGETS: [&str; 5] = ["opentelemetry", "hyper", "h2", "reqwest", "tonic"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Signal {
    Logs,
    Metrics,
    Traces,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Logs => write!(f, "logs"),
            Signal::Metrics => write!(f, "metrics"),
            Signal::Traces => write!(f, "traces"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingOptions {
    /// Put the event fields, `message` included, at the top level of each
    /// record instead of nesting them under `fields`. The message is always
    /// emitted either way.
    pub include_formatted_message: bool,
    /// Attach the active span and the span list to every record
    pub include_scopes: bool,
    /// Level used when RUST_LOG is not set, INFO if `None`
    pub default_level: Option<LevelFilter>,
}

/// Maps a configured level name onto a filter. Accepts the `tracing` names as
/// well as the `Information`, `Warning`, `Critical` and `None` spellings of
/// settings files.
pub fn parse_log_level(level: &str) -> Option<LevelFilter> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(LevelFilter::TRACE),
        "debug" => Some(LevelFilter::DEBUG),
        "information" | "info" => Some(LevelFilter::INFO),
        "warning" | "warn" => Some(LevelFilter::WARN),
        "error" | "critical" => Some(LevelFilter::ERROR),
        "none" | "off" => Some(LevelFilter::OFF),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub service_name: String,
    pub service_namespace: String,
    pub service_version: String,
    pub attributes: BTreeMap<String, String>,
}

impl ResourceDescriptor {
    pub fn new(assembly: &AssemblyIdentity, environment: &str) -> Self {
        Self {
            service_name: assembly.name.clone(),
            service_namespace: environment.to_owned(),
            service_version: assembly.version.clone(),
            attributes: BTreeMap::from([("environment.name".to_owned(), environment.to_owned())]),
        }
    }

    pub fn to_resource(&self) -> Resource {
        let attributes = self
            .attributes
            .iter()
            .map(|(key, value)| KeyValue::new(key.clone(), value.clone()))
            .chain([
                KeyValue::new("service.namespace", self.service_namespace.clone()),
                KeyValue::new("service.version", self.service_version.clone()),
            ]);

        Resource::builder()
            .with_service_name(self.service_name.clone())
            .with_attributes(attributes)
            .build()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsOptions {
    pub runtime_instrumentation: bool,
    pub meters: Vec<String>,
}

impl MetricsOptions {
    pub fn add_meter(&mut self, name: &str) -> &mut Self {
        if !self.meters.iter().any(|meter| meter == name) {
            self.meters.push(name.to_owned());
        }
        self
    }

    /// True if the instruments of this meter are exported. Meters that were
    /// not added are dropped, except the runtime meter when runtime
    /// instrumentation is on.
    pub fn exports(&self, meter: &str) -> bool {
        (self.runtime_instrumentation && meter == RUNTIME_METER)
            || self.meters.iter().any(|added| added == meter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instrumentation {
    InboundHttp,
    OutboundRpc,
    OutboundHttp,
}

impl Instrumentation {
    /// `tracing` target prefix of the spans this instrumentation emits.
    pub fn target(&self) -> &'static str {
        match self {
            Instrumentation::InboundHttp => "tower_http::trace",
            Instrumentation::OutboundRpc => "tonic",
            Instrumentation::OutboundHttp => "service_defaults::http_client",
        }
    }
}

/// A `tracing` target pattern. A trailing `*` matches any suffix, otherwise
/// the pattern matches the target itself and its child modules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceSource(String);

impl TraceSource {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    pub fn pattern(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, target: &str) -> bool {
        match self.0.strip_suffix('*') {
            Some(prefix) => target.starts_with(prefix),
            None => {
                target == self.0
                    || target
                        .strip_prefix(self.0.as_str())
                        .is_some_and(|rest| rest.starts_with("::"))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplerChoice {
    AlwaysOn,
    AlwaysOff,
    TraceIdRatio(f64),
}

impl SamplerChoice {
    fn to_sampler(self) -> Sampler {
        match self {
            SamplerChoice::AlwaysOn => Sampler::AlwaysOn,
            SamplerChoice::AlwaysOff => Sampler::AlwaysOff,
            SamplerChoice::TraceIdRatio(ratio) => Sampler::TraceIdRatioBased(ratio),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TracingOptions {
    /// `None` keeps the SDK default sampler
    pub sampler: Option<SamplerChoice>,
    pub sources: Vec<TraceSource>,
    pub instrumentations: Vec<Instrumentation>,
}

impl TracingOptions {
    pub fn add_source(&mut self, pattern: impl Into<String>) -> &mut Self {
        let source = TraceSource::new(pattern);
        if !self.sources.contains(&source) {
            self.sources.push(source);
        }
        self
    }

    pub fn add_instrumentation(&mut self, instrumentation: Instrumentation) -> &mut Self {
        if !self.instrumentations.contains(&instrumentation) {
            self.instrumentations.push(instrumentation);
        }
        self
    }

    pub fn has_instrumentation(&self, instrumentation: Instrumentation) -> bool {
        self.instrumentations.contains(&instrumentation)
    }

    /// True if spans with this target are exported.
    pub fn should_export(&self, target: &str) -> bool {
        self.sources.iter().any(|source| source.matches(target))
            || self
                .instrumentations
                .iter()
                .any(|instrumentation| target.starts_with(instrumentation.target()))
    }
}

/// OTLP over HTTP. Without an explicit endpoint, the exporter reads the
/// standard `OTEL_EXPORTER_OTLP_*` variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OtlpExporter {
    pub endpoint: Option<String>,
}

impl OtlpExporter {
    fn signal_endpoint(&self, path: &str) -> Option<String> {
        self.endpoint
            .as_ref()
            .map(|endpoint| format!("{}{}", endpoint.trim_end_matches('/'), path))
    }
}

/// One exporter slot per signal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exporters {
    pub logs: Option<OtlpExporter>,
    pub metrics: Option<OtlpExporter>,
    pub traces: Option<OtlpExporter>,
}

impl Exporters {
    pub fn attach(&mut self, signal: Signal, exporter: OtlpExporter) -> &mut Self {
        *self.slot(signal) = Some(exporter);
        self
    }

    pub fn get(&self, signal: Signal) -> Option<&OtlpExporter> {
        match signal {
            Signal::Logs => self.logs.as_ref(),
            Signal::Metrics => self.metrics.as_ref(),
            Signal::Traces => self.traces.as_ref(),
        }
    }

    pub fn attached(&self) -> Vec<Signal> {
        [Signal::Logs, Signal::Metrics, Signal::Traces]
            .into_iter()
            .filter(|signal| self.get(*signal).is_some())
            .collect()
    }

    fn slot(&mut self, signal: Signal) -> &mut Option<OtlpExporter> {
        match signal {
            Signal::Logs => &mut self.logs,
            Signal::Metrics => &mut self.metrics,
            Signal::Traces => &mut self.traces,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryOptions {
    pub logging: Option<LoggingOptions>,
    pub resource: Option<ResourceDescriptor>,
    pub metrics: MetricsOptions,
    pub tracing: TracingOptions,
    pub exporters: Exporters,
}

impl TelemetryOptions {
    /// Takes the default log level from `Logging:LogLevel:Default`, if set.
    pub fn apply_configuration(&mut self, configuration: &Configuration) {
        let Some(level) = configuration.get_string(LOG_LEVEL_KEY) else {
            return;
        };
        match parse_log_level(&level) {
            Some(filter) => {
                self.logging.get_or_insert_with(LoggingOptions::default).default_level =
                    Some(filter);
            }
            None => eprintln!("ignoring unknown log level {level:?} in {LOG_LEVEL_KEY}"),
        }
    }

    /// Builds the providers for the attached exporters, initializes the
    /// tracing subscriber and registers the providers and the trace context
    /// propagator globally. Each exporter is built independently: one failing
    /// is logged and does not prevent the others.
    pub fn install(&self) -> Result<TelemetryGuard, ServiceDefaultsError> {
        let resource = self
            .resource
            .as_ref()
            .map(ResourceDescriptor::to_resource)
            .unwrap_or_else(|| Resource::builder().build());
        let mut failures = Vec::new();

        let tracer_provider = self.exporters.traces.as_ref().and_then(|exporter| {
            build_tracer_provider(exporter, &self.tracing, resource.clone())
                .map_err(|err| failures.push(err))
                .ok()
        });
        let meter_provider = self.exporters.metrics.as_ref().and_then(|exporter| {
            build_meter_provider(exporter, &self.metrics, resource.clone())
                .map_err(|err| failures.push(err))
                .ok()
        });
        let logger_provider = self.exporters.logs.as_ref().and_then(|exporter| {
            build_logger_provider(exporter, resource.clone())
                .map_err(|err| failures.push(err))
                .ok()
        });

        // Shuts the providers down if the subscriber cannot be installed
        let guard = TelemetryGuard {
            tracer_provider,
            meter_provider,
            logger_provider,
        };

        init_subscriber(
            &self.logging.clone().unwrap_or_default(),
            &self.tracing,
            &guard.tracer_provider,
            &guard.logger_provider,
        )?;

        global::set_text_map_propagator(TraceContextPropagator::new());
        if let Some(provider) = &guard.tracer_provider {
            global::set_tracer_provider(provider.clone());
        }
        if let Some(provider) = &guard.meter_provider {
            global::set_meter_provider(provider.clone());
        }

        for failure in failures {
            warn!(error = %failure, "telemetry exporter disabled");
        }

        if self.metrics.runtime_instrumentation {
            register_runtime_instrumentation();
        }

        Ok(guard)
    }
}

/// Flushes and shuts down the installed providers when dropped.
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
    logger_provider: Option<SdkLoggerProvider>,
}

impl TelemetryGuard {
    pub fn installed(&self) -> Vec<Signal> {
        let mut signals = Vec::new();
        if self.logger_provider.is_some() {
            signals.push(Signal::Logs);
        }
        if self.meter_provider.is_some() {
            signals.push(Signal::Metrics);
        }
        if self.tracer_provider.is_some() {
            signals.push(Signal::Traces);
        }
        signals
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("Error shutting down tracer provider: {e}");
            }
        }

        if let Some(provider) = self.logger_provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("Error shutting down logger provider: {e}");
            }
        }

        if let Some(provider) = self.meter_provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("Error shutting down meter provider: {e}");
            }
        }
    }
}

fn exporter_error(signal: Signal, err: impl fmt::Display) -> ServiceDefaultsError {
    ServiceDefaultsError::Telemetry {
        signal,
        reason: err.to_string(),
    }
}

fn build_tracer_provider(
    exporter: &OtlpExporter,
    tracing: &TracingOptions,
    resource: Resource,
) -> Result<SdkTracerProvider, ServiceDefaultsError> {
    let mut builder = opentelemetry_otlp::SpanExporter::builder().with_http();
    if let Some(endpoint) = exporter.signal_endpoint("/v1/traces") {
        builder = builder.with_endpoint(endpoint);
    }
    let span_exporter = builder
        .build()
        .map_err(|err| exporter_error(Signal::Traces, err))?;

    let mut provider = SdkTracerProvider::builder()
        .with_batch_exporter(span_exporter)
        .with_resource(resource);
    if let Some(sampler) = tracing.sampler {
        provider = provider.with_sampler(sampler.to_sampler());
    }
    Ok(provider.build())
}

fn build_meter_provider(
    exporter: &OtlpExporter,
    metrics: &MetricsOptions,
    resource: Resource,
) -> Result<SdkMeterProvider, ServiceDefaultsError> {
    let mut builder = opentelemetry_otlp::MetricExporter::builder().with_http();
    if let Some(endpoint) = exporter.signal_endpoint("/v1/metrics") {
        builder = builder.with_endpoint(endpoint);
    }
    let metric_exporter = builder
        .build()
        .map_err(|err| exporter_error(Signal::Metrics, err))?;

    let metrics = metrics.clone();
    Ok(SdkMeterProvider::builder()
        .with_periodic_exporter(metric_exporter)
        .with_resource(resource)
        .with_view(move |instrument: &Instrument| {
            match metrics.exports(instrument.scope().name()) {
                true => None,
                false => Stream::builder()
                    .with_aggregation(Aggregation::Drop)
                    .build()
                    .ok(),
            }
        })
        .build())
}

fn build_logger_provider(
    exporter: &OtlpExporter,
    resource: Resource,
) -> Result<SdkLoggerProvider, ServiceDefaultsError> {
    let mut builder = opentelemetry_otlp::LogExporter::builder().with_http();
    if let Some(endpoint) = exporter.signal_endpoint("/v1/logs") {
        builder = builder.with_endpoint(endpoint);
    }
    let log_exporter = builder
        .build()
        .map_err(|err| exporter_error(Signal::Logs, err))?;

    Ok(SdkLoggerProvider::builder()
        .with_batch_exporter(log_exporter)
        .with_resource(resource)
        .build())
}

fn init_subscriber(
    logging: &LoggingOptions,
    tracing_options: &TracingOptions,
    tracer_provider: &Option<SdkTracerProvider>,
    logger_provider: &Option<SdkLoggerProvider>,
) -> Result<(), ServiceDefaultsError> {
    let filter = EnvFilter::builder()
        .with_default_directive(logging.default_level.unwrap_or(LevelFilter::INFO).into())
        .from_env_lossy();

    let log_layer = json_log_layer(logging, std::io::stdout);

    let otel_layer = tracer_provider.as_ref().map(|provider| {
        let options = tracing_options.clone();
        tracing_opentelemetry::layer()
            .with_tracer(provider.tracer(TRACER_NAME))
            .with_filter(filter_fn(move |metadata| {
                !metadata.is_span() || options.should_export(metadata.target())
            }))
    });

    let bridge_layer = logger_provider.as_ref().map(|provider| {
        OpenTelemetryTracingBridge::new(provider).with_filter(filter_fn(|metadata| {
            !LOG_BRIDGE_EXCLUDED_TARGETS
                .iter()
                .any(|excluded| metadata.target().starts_with(excluded))
        }))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(log_layer)
        .with(otel_layer)
        .with(bridge_layer)
        .try_init()?;

    Ok(())
}

fn json_log_layer<S, W>(
    logging: &LoggingOptions,
    writer: W,
) -> tracing_subscriber::fmt::Layer<S, JsonFields, Format<Json>, W>
where
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .flatten_event(logging.include_formatted_message)
        .with_current_span(logging.include_scopes)
        .with_span_list(logging.include_scopes)
        .with_writer(writer)
}

/// Tokio scheduler gauges, observed on each metrics collection.
fn register_runtime_instrumentation() {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        warn!("runtime instrumentation needs a tokio runtime, skipping");
        return;
    };
    let meter = global::meter(RUNTIME_METER);

    let workers = handle.clone();
    meter
        .u64_observable_gauge("tokio.runtime.workers")
        .with_description("Number of worker threads used by the runtime")
        .with_callback(move |observer| observer.observe(workers.metrics().num_workers() as u64, &[]))
        .build();

    let tasks = handle.clone();
    meter
        .u64_observable_gauge("tokio.runtime.alive_tasks")
        .with_description("Number of tasks currently alive in the runtime")
        .with_callback(move |observer| {
            observer.observe(tasks.metrics().num_alive_tasks() as u64, &[])
        })
        .build();

    meter
        .u64_observable_gauge("tokio.runtime.global_queue_depth")
        .with_description("Number of tasks waiting in the runtime's global queue")
        .with_callback(move |observer| {
            observer.observe(handle.metrics().global_queue_depth() as u64, &[])
        })
        .build();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Buffer {
        type Writer = Buffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn log_record(logging: &LoggingOptions) -> serde_json::Value {
        let buffer = Buffer::default();
        let subscriber = tracing_subscriber::registry().with(json_log_layer(logging, buffer.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info_span!("checkout", order = 7).in_scope(|| {
                tracing::info!(items = 2, "order placed");
            });
        });

        let bytes = buffer.0.lock().unwrap().clone();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn flattened_records_with_scopes() {
        let record = log_record(&LoggingOptions {
            include_formatted_message: true,
            include_scopes: true,
            default_level: None,
        });

        assert_eq!(record["message"], "order placed");
        assert_eq!(record["items"], 2);
        assert_eq!(record["span"]["name"], "checkout");
        assert_eq!(record["spans"][0]["order"], 7);
    }

    #[test]
    fn nested_records_still_carry_the_message() {
        let record = log_record(&LoggingOptions::default());

        assert_eq!(record["fields"]["message"], "order placed");
        assert!(record.get("message").is_none());
        assert!(record.get("span").is_none());
    }

    #[test]
    fn log_levels_from_settings_files() {
        assert_eq!(parse_log_level("Information"), Some(LevelFilter::INFO));
        assert_eq!(parse_log_level("Warning"), Some(LevelFilter::WARN));
        assert_eq!(parse_log_level("Critical"), Some(LevelFilter::ERROR));
        assert_eq!(parse_log_level("debug"), Some(LevelFilter::DEBUG));
        assert_eq!(parse_log_level("None"), Some(LevelFilter::OFF));
        assert_eq!(parse_log_level("verbose"), None);
    }

    #[test]
    fn configured_level_becomes_the_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("appsettings.json"),
            r#"{"Logging": {"LogLevel": {"Default": "Warning"}}}"#,
        )
        .unwrap();
        let mut builder = crate::ConfigurationBuilder::new();
        builder.add_json_file("appsettings.json", false);
        let configuration = builder.build(dir.path()).unwrap();

        let mut telemetry = TelemetryOptions::default();
        telemetry.apply_configuration(&configuration);
        assert_eq!(
            telemetry.logging.and_then(|logging| logging.default_level),
            Some(LevelFilter::WARN)
        );

        let mut untouched = TelemetryOptions::default();
        untouched.apply_configuration(&crate::Configuration::default());
        assert_eq!(untouched.logging, None);
    }

    #[test]
    fn only_added_meters_are_exported() {
        let mut metrics = MetricsOptions::default();
        for meter in BUILT_IN_METERS {
            metrics.add_meter(meter);
        }

        assert!(metrics.exports(HOSTING_METER));
        assert!(metrics.exports(HTTP_CLIENT_METER));
        assert!(!metrics.exports("sqlx"));
        assert!(!metrics.exports(RUNTIME_METER));

        metrics.runtime_instrumentation = true;
        assert!(metrics.exports(RUNTIME_METER));
    }

    #[test]
    fn wildcard_source_matches_crate_targets() {
        let source = TraceSource::new("sample_api*");
        assert!(source.matches("sample_api"));
        assert!(source.matches("sample_api::handlers"));
        assert!(!source.matches("tower_http::trace::on_request"));
    }

    #[test]
    fn exact_source_matches_child_modules_only() {
        let source = TraceSource::new("tonic");
        assert!(source.matches("tonic"));
        assert!(source.matches("tonic::transport"));
        assert!(!source.matches("tonic_build"));
    }

    #[test]
    fn export_filter_covers_sources_and_instrumentations() {
        let mut tracing = TracingOptions::default();
        tracing
            .add_source("sample_api*")
            .add_instrumentation(Instrumentation::InboundHttp)
            .add_instrumentation(Instrumentation::OutboundHttp);

        assert!(tracing.should_export("sample_api::routes"));
        assert!(tracing.should_export("tower_http::trace::make_span"));
        assert!(tracing.should_export("service_defaults::http_client"));
        assert!(!tracing.should_export("tonic::transport"));
        assert!(!tracing.should_export("sqlx::query"));
    }

    #[test]
    fn exporter_slots_are_independent() {
        let mut exporters = Exporters::default();
        assert!(exporters.attached().is_empty());

        exporters.attach(Signal::Metrics, OtlpExporter::default());
        exporters.attach(Signal::Metrics, OtlpExporter::default());
        assert_eq!(exporters.attached(), vec![Signal::Metrics]);
        assert!(exporters.get(Signal::Logs).is_none());
    }

    #[test]
    fn signal_endpoints_append_paths() {
        let exporter = OtlpExporter {
            endpoint: Some("http://collector:4318/".to_owned()),
        };
        assert_eq!(
            exporter.signal_endpoint("/v1/traces"),
            Some("http://collector:4318/v1/traces".to_owned())
        );
        assert_eq!(OtlpExporter::default().signal_endpoint("/v1/logs"), None);
    }

    #[test]
    fn resource_descriptor_carries_environment() {
        let descriptor =
            ResourceDescriptor::new(&AssemblyIdentity::new("sample-api", "1.0.0"), "Staging");
        assert_eq!(descriptor.service_name, "sample-api");
        assert_eq!(descriptor.service_namespace, "Staging");
        assert_eq!(descriptor.service_version, "1.0.0");
        assert_eq!(
            descriptor.attributes.get("environment.name"),
            Some(&"Staging".to_owned())
        );
    }
}
