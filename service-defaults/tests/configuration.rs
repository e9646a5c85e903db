use std::path::Path;

use figment::Jail;
use service_defaults::{
    AssemblyIdentity, HostBuilder, HostSettings, StartupFlags, WebApplication,
};

// Every test runs in a `Jail`: it serializes tests that touch the process
// environment and restores the variables they set.

fn build(content_root: &Path, environment: &str) -> Result<WebApplication, String> {
    let app = HostBuilder::with_settings(HostSettings {
        environment: environment.to_owned(),
        host: "127.0.0.1".to_owned(),
        port: 0,
        content_root: content_root.to_path_buf(),
    })
    .add_service_defaults(&StartupFlags::new(
        AssemblyIdentity::new("sample-api", "0.1.0"),
        false,
        false,
    ))
    .map_err(|e| e.to_string())?
    .build()
    .map_err(|e| e.to_string())?;

    Ok(app)
}

#[test]
fn later_sources_win() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "appsettings.json",
            r#"{"LayeringTest": {"Everywhere": "base", "InFiles": "base", "BaseOnly": "base"}}"#,
        )?;
        jail.create_file(
            "appsettings.Testing.json",
            r#"{"LayeringTest": {"Everywhere": "environment file", "InFiles": "environment file"}}"#,
        )?;
        jail.set_env("LayeringTest__Everywhere", "environment variable");

        let app = build(jail.directory(), "Testing")?;
        let configuration = app.configuration();

        assert_eq!(
            configuration.get_string("LayeringTest:Everywhere").as_deref(),
            Some("environment variable")
        );
        assert_eq!(
            configuration.get_string("LayeringTest:InFiles").as_deref(),
            Some("environment file")
        );
        assert_eq!(
            configuration.get_string("layeringtest.baseonly").as_deref(),
            Some("base")
        );

        Ok(())
    });
}

#[test]
fn environment_variables_do_not_outlive_the_test() {
    Jail::expect_with(|jail| {
        jail.create_file("appsettings.json", r#"{"LayeringTest": {"Everywhere": "base"}}"#)?;

        let app = build(jail.directory(), "Testing")?;

        assert_eq!(
            app.configuration().get_string("LayeringTest:Everywhere").as_deref(),
            Some("base")
        );

        Ok(())
    });
}

#[test]
fn environment_file_is_optional() {
    Jail::expect_with(|jail| {
        jail.create_file("appsettings.json", r#"{"OptionalTest": {"Name": "base only"}}"#)?;

        let app = build(jail.directory(), "NoSuchEnvironment")?;

        assert_eq!(
            app.configuration().get_string("OptionalTest:Name").as_deref(),
            Some("base only")
        );
        assert_eq!(app.environment().name(), "NoSuchEnvironment");

        Ok(())
    });
}

#[test]
fn sections_deserialize_into_types() {
    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct Upstream {
        url: String,
        retries: u32,
    }

    Jail::expect_with(|jail| {
        jail.create_file(
            "appsettings.json",
            r#"{"TypedTest": {"Upstream": {"Url": "http://catalog", "Retries": 2}}}"#,
        )?;

        let app = build(jail.directory(), "Production")?;
        let configuration = app.configuration();

        assert_eq!(
            configuration
                .get::<Upstream>("TypedTest:Upstream")
                .map_err(|e| e.to_string())?,
            Some(Upstream {
                url: "http://catalog".to_owned(),
                retries: 2,
            })
        );
        assert_eq!(
            configuration
                .get::<Upstream>("TypedTest:Missing")
                .map_err(|e| e.to_string())?,
            None
        );

        Ok(())
    });
}
