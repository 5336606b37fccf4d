//! Binary entrypoint for the Persistence of Memory API server.
use anyhow::Context;
use pom_api::run;
use pom_core::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // POM_CONFIG names a YAML file; POM_ADDR overrides the listen address
    let config = Config::from_env().context("loading configuration")?;
    run(config).await
}
