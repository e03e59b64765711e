//! Blocky Operator - runs Blocky DNS proxies as owned Deployments

use std::time::Duration;

use clap::Parser;
use kube::Client;

use blocky_common::telemetry::{init_telemetry, TelemetryConfig};
use blocky_common::IMAGE_ENV_VAR;
use blocky_controller::ControllerConfig;
use blocky_operator::controller_runner::build_blocky_controller;
use blocky_operator::{crd_yaml, ensure_crd_installed};

/// Blocky operator - reconciles Blocky resources into Deployments
#[derive(Parser, Debug)]
#[command(name = "blocky-operator", version, about, long_about = None)]
struct Cli {
    /// Print the Blocky CRD manifest and exit
    #[arg(long)]
    crd: bool,

    /// Operand container image
    #[arg(long, env = IMAGE_ENV_VAR, default_value = "")]
    image: String,

    /// Per-reconcile deadline for API calls, in seconds
    #[arg(long, env = "BLOCKY_RECONCILE_TIMEOUT", default_value_t = 30)]
    reconcile_timeout: u64,

    /// Requeue delay after creating a Deployment, in seconds
    #[arg(long, env = "BLOCKY_CREATION_REQUEUE", default_value_t = 5)]
    creation_requeue: u64,

    /// Skip installing the CRD on startup
    #[arg(long)]
    skip_crd_install: bool,
}

impl Cli {
    fn controller_config(&self) -> anyhow::Result<ControllerConfig> {
        Ok(ControllerConfig::new(self.image.as_str())?
            .with_reconcile_timeout(Duration::from_secs(self.reconcile_timeout))
            .with_creation_requeue(Duration::from_secs(self.creation_requeue)))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        println!("{}", crd_yaml()?);
        return Ok(());
    }

    init_telemetry(TelemetryConfig::default())?;

    let config = cli.controller_config()?;
    tracing::info!(
        image = %config.image,
        reconcile_timeout_secs = config.reconcile_timeout.as_secs(),
        creation_requeue_secs = config.creation_requeue.as_secs(),
        "Starting Blocky operator"
    );

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if !cli.skip_crd_install {
        ensure_crd_installed(&client).await?;
    }

    build_blocky_controller(client, config).await;

    tracing::info!("Blocky operator shut down");
    Ok(())
}
