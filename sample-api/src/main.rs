use eyre::Result;
use service_defaults::{assembly_identity, HostBuilder, StartupFlags};

mod handlers;

#[tokio::main]
async fn main() -> Result<()> {
    let builder = HostBuilder::new()?;
    let flags = StartupFlags::from_environment(assembly_identity!(), builder.environment());

    let app = builder.add_service_defaults(&flags)?.build()?;
    let catalog = match app.http_clients() {
        Some(factory) => factory.create_client("catalog")?,
        None => eyre::bail!("http client factory is not registered"),
    };

    let app = handlers::add_routes(app, catalog).map_default_health_check_endpoints();

    if let Err(e) = app.run().await {
        tracing::error!("failed to run sample-api http server, {}", e);
        return Err(e.into());
    }

    Ok(())
}
