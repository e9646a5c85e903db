use crate::host::HostEnvironment;

const OTLP_ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Name and version of the binary the defaults are added for. Feeds the
/// telemetry resource and the trace source wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyIdentity {
    pub name: String,
    pub version: String,
}

impl AssemblyIdentity {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// The crate name as it appears in `tracing` targets.
    pub fn namespace(&self) -> String {
        self.name.replace('-', "_")
    }
}

/// Identity of the calling crate, read from its Cargo metadata.
#[macro_export]
macro_rules! assembly_identity {
    () => {
        $crate::AssemblyIdentity::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    };
}

#[derive(Debug, Clone, Default)]
pub struct StartupFlags {
    pub executing_assembly: Option<AssemblyIdentity>,
    pub use_otlp_exporter: bool,
    pub is_development: bool,
}

impl StartupFlags {
    pub fn new(
        executing_assembly: AssemblyIdentity,
        use_otlp_exporter: bool,
        is_development: bool,
    ) -> Self {
        Self {
            executing_assembly: Some(executing_assembly),
            use_otlp_exporter,
            is_development,
        }
    }

    /// Exports over OTLP when `OTEL_EXPORTER_OTLP_ENDPOINT` is set, and treats
    /// the `Development` environment as development.
    pub fn from_environment(
        executing_assembly: AssemblyIdentity,
        environment: &HostEnvironment,
    ) -> Self {
        let endpoint = std::env::var(OTLP_ENDPOINT_VAR).ok();
        Self::from_parts(executing_assembly, environment, endpoint.as_deref())
    }

    fn from_parts(
        executing_assembly: AssemblyIdentity,
        environment: &HostEnvironment,
        otlp_endpoint: Option<&str>,
    ) -> Self {
        Self::new(
            executing_assembly,
            otlp_endpoint.is_some_and(|endpoint| !endpoint.trim().is_empty()),
            environment.is_development(),
        )
    }
}
