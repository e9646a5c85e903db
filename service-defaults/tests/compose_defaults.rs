use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use service_defaults::health::LIVE_TAG;
use service_defaults::telemetry::{Instrumentation, SamplerChoice, Signal, BUILT_IN_METERS};
use service_defaults::{
    AssemblyIdentity, ConfigSource, HostBuilder, HostSettings, HttpClientDefaults,
    ServiceDefaultsError, StartupFlags, SELF_CHECK,
};

fn builder(content_root: &Path, environment: &str) -> HostBuilder {
    HostBuilder::with_settings(HostSettings {
        environment: environment.to_owned(),
        host: "127.0.0.1".to_owned(),
        port: 0,
        content_root: content_root.to_path_buf(),
    })
}

fn identity() -> AssemblyIdentity {
    AssemblyIdentity::new("sample-api", "1.4.0")
}

#[test]
fn missing_identity_fails_for_every_flag_combination() {
    for use_otlp_exporter in [false, true] {
        for is_development in [false, true] {
            let flags = StartupFlags {
                executing_assembly: None,
                use_otlp_exporter,
                is_development,
            };

            let result = builder(Path::new("."), "Production").add_service_defaults(&flags);

            assert!(matches!(
                result,
                Err(ServiceDefaultsError::MissingAssemblyIdentity)
            ));
        }
    }
}

#[test]
fn exporters_follow_the_otlp_flag() -> anyhow::Result<()> {
    let without = builder(Path::new("."), "Production")
        .add_service_defaults(&StartupFlags::new(identity(), false, false))?;
    assert!(without.telemetry().exporters.attached().is_empty());

    let with = builder(Path::new("."), "Production")
        .add_service_defaults(&StartupFlags::new(identity(), true, false))?;
    assert_eq!(
        with.telemetry().exporters.attached(),
        vec![Signal::Logs, Signal::Metrics, Signal::Traces]
    );

    Ok(())
}

#[test]
fn development_forces_the_sampler() -> anyhow::Result<()> {
    let development = builder(Path::new("."), "Development")
        .add_service_defaults(&StartupFlags::new(identity(), false, true))?;
    assert_eq!(
        development.telemetry().tracing.sampler,
        Some(SamplerChoice::AlwaysOn)
    );

    let production = builder(Path::new("."), "Production")
        .add_service_defaults(&StartupFlags::new(identity(), false, false))?;
    assert_eq!(production.telemetry().tracing.sampler, None);

    Ok(())
}

#[test]
fn self_check_is_live_and_healthy() -> anyhow::Result<()> {
    let builder = builder(Path::new("."), "Production")
        .add_service_defaults(&StartupFlags::new(identity(), false, false))?;

    let health_checks = builder.health_checks();
    assert_eq!(health_checks.len(), 1);

    let check = health_checks.get(SELF_CHECK).expect("self check is registered");
    assert_eq!(check.tags(), &BTreeSet::from([LIVE_TAG.to_owned()]));
    assert!(check.evaluate().healthy);

    Ok(())
}

#[test]
fn configuration_sources_are_layered_in_order() -> anyhow::Result<()> {
    let builder = builder(Path::new("."), "Staging")
        .add_service_defaults(&StartupFlags::new(identity(), false, false))?;

    assert_eq!(
        builder.configuration().sources(),
        &[
            ConfigSource::JsonFile {
                path: PathBuf::from("appsettings.json"),
                optional: false,
            },
            ConfigSource::JsonFile {
                path: PathBuf::from("appsettings.Staging.json"),
                optional: true,
            },
            ConfigSource::EnvironmentVariables { prefix: None },
        ]
    );

    Ok(())
}

#[test]
fn telemetry_describes_the_service() -> anyhow::Result<()> {
    let builder = builder(Path::new("."), "Staging")
        .add_service_defaults(&StartupFlags::new(identity(), false, false))?;
    let telemetry = builder.telemetry();

    let logging = telemetry.logging.as_ref().expect("logging is configured");
    assert!(logging.include_formatted_message);
    assert!(logging.include_scopes);

    let resource = telemetry.resource.as_ref().expect("resource is configured");
    assert_eq!(resource.service_name, "sample-api");
    assert_eq!(resource.service_version, "1.4.0");
    assert_eq!(
        resource.attributes.get("environment.name").map(String::as_str),
        Some("Staging")
    );

    assert!(telemetry.metrics.runtime_instrumentation);
    assert_eq!(telemetry.metrics.meters, BUILT_IN_METERS.to_vec());

    let sources: Vec<&str> = telemetry
        .tracing
        .sources
        .iter()
        .map(|source| source.pattern())
        .collect();
    assert_eq!(sources, vec!["sample_api*"]);
    assert_eq!(
        telemetry.tracing.instrumentations,
        vec![
            Instrumentation::InboundHttp,
            Instrumentation::OutboundRpc,
            Instrumentation::OutboundHttp,
        ]
    );

    Ok(())
}

#[test]
fn http_clients_get_the_standard_defaults() -> anyhow::Result<()> {
    let builder = builder(Path::new("."), "Production")
        .add_service_defaults(&StartupFlags::new(identity(), false, false))?;

    assert_eq!(builder.http_client_defaults(), &HttpClientDefaults::standard());
    assert!(builder.has_http_client_factory());
    assert!(builder.has_service_discovery());

    Ok(())
}

#[test]
fn composing_twice_equals_composing_once() -> anyhow::Result<()> {
    let flags = StartupFlags::new(identity(), true, true);

    let once = builder(Path::new("."), "Development").add_service_defaults(&flags)?;
    let twice = builder(Path::new("."), "Development")
        .add_service_defaults(&flags)?
        .add_service_defaults(&flags)?;

    assert_eq!(once.telemetry(), twice.telemetry());
    assert_eq!(once.configuration().sources(), twice.configuration().sources());
    assert_eq!(once.http_client_defaults(), twice.http_client_defaults());
    assert_eq!(once.health_checks().len(), twice.health_checks().len());

    Ok(())
}

#[test]
fn missing_base_settings_fail_at_build() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;

    let composed = builder(dir.path(), "Production")
        .add_service_defaults(&StartupFlags::new(identity(), false, false))?;

    match composed.build() {
        Err(ServiceDefaultsError::MissingConfigFile(path)) => {
            assert_eq!(path, dir.path().join("appsettings.json"));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("build should fail without appsettings.json"),
    }

    Ok(())
}
