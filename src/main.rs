//! Example binary demonstrating the halldyll_beanstalk library.
//!
//! Lists the environments and versions of the configured application. When
//! `BEANSTALK_ENVIRONMENT` and `BEANSTALK_DEPLOY_LABEL` are both set, also
//! deploys that label and waits for the environment to be Ready again.
//!
//! ## Usage
//!
//! 1. Create a `.env` file with your configuration
//! 2. Run: `RUST_LOG=info cargo run`

#![allow(clippy::print_stdout)] // Allow println! in the binary example

use std::{env, sync::Arc};

use halldyll_beanstalk::{
    BeanstalkApplication, BeanstalkClientConfig, BeanstalkConfig, BeanstalkHttpClient,
    EnvironmentUpdate,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration from environment
    let cfg = BeanstalkConfig::from_env()?;
    let client_cfg = BeanstalkClientConfig::from_env()?;
    println!("Configuration loaded:");
    println!("  Application: {}", cfg.application_name);
    println!("  Gateway: {}", client_cfg.api_url);
    println!("  Sync timeout: {}s", cfg.sync_timeout_secs);

    let client = Arc::new(BeanstalkHttpClient::new(client_cfg)?);
    let app = BeanstalkApplication::new(cfg, client);

    println!("\nEnvironments:");
    for mut environment in app.environments().await? {
        let status = environment.status().await?;
        let version = environment.version_label().await?.unwrap_or_default();
        println!(
            "  {} status={} version={}",
            environment.identity().environment_name(),
            status,
            version
        );
    }

    println!("\nApplication versions (newest first):");
    for version in app.releases().application_versions().await? {
        println!("  {} updated {}", version.version_label, version.date_updated);
    }

    if let (Ok(name), Ok(label)) = (
        env::var("BEANSTALK_ENVIRONMENT"),
        env::var("BEANSTALK_DEPLOY_LABEL"),
    ) {
        println!("\nDeploying {label} to {name}...");
        let mut environment = app.environment(name);
        let converged = environment
            .synchronize_update(None, [EnvironmentUpdate::Deploy(label.clone())])
            .await?;
        environment.ensure_version(&label).await?;

        println!(
            "Deployed in {}s ({} polls)",
            converged.elapsed.as_secs(),
            converged.polls
        );
    }

    Ok(())
}
