use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use secret_rotator::{
    cli::Cli,
    config::{AppSettings, ConfigAgent, ConfigSource, FileConfigSource, StoreKind},
    observability::{init_logging, init_metrics, log_settings_info, LoggingConfig},
    provisioners::{ProvisionerRegistry, RandomProvisioner},
    rotation::{RotatorSettings, SecretRotator},
    secrets::{InMemorySecretStore, SecretStore},
    APP_NAME, VERSION,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load .env file if it exists (optional - won't fail if missing)
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let settings = Cli::parse().into_settings()?;

    init_logging(&LoggingConfig {
        level: settings.log_level.clone(),
        json: settings.json_logging,
    })?;
    info!(app_name = APP_NAME, version = VERSION, "Starting secret rotator");
    log_settings_info(&settings);

    if let Some(port) = settings.metrics_port {
        init_metrics(port)?;
    }

    let store = build_store(settings.store).await?;
    let registry = Arc::new(build_registry(&settings).await);

    let agent = Arc::new(ConfigAgent::new());
    let source: Arc<dyn ConfigSource> = Arc::new(FileConfigSource::new(&settings.config_path));
    let watcher = agent
        .watch_config(source)
        .await
        .with_context(|| format!("Failed to load {}", settings.config_path.display()))?;

    let stop = CancellationToken::new();
    let watch_task = tokio::spawn(watcher.run(stop.clone()));

    let rotator = SecretRotator::new(store, agent, registry, RotatorSettings::from(&settings));

    let code = if settings.dry_run {
        print_plan(&rotator).await?;
        ExitCode::SUCCESS
    } else if settings.run_once {
        let report = rotator.run_once().await;
        if report.is_success() {
            ExitCode::SUCCESS
        } else {
            error!(failed = ?report.failed(), "Rotation pass failed for some secrets");
            ExitCode::FAILURE
        }
    } else {
        let signal_stop = stop.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            signal_stop.cancel();
        });
        rotator.start(stop.clone()).await;
        ExitCode::SUCCESS
    };

    stop.cancel();
    if let Err(e) = watch_task.await {
        warn!(error = %e, "Config watcher task ended abnormally");
    }

    info!("Secret rotator stopped");
    Ok(code)
}

async fn build_store(kind: StoreKind) -> anyhow::Result<Arc<dyn SecretStore>> {
    match kind {
        StoreKind::Memory => {
            warn!("Using in-memory secret store; versions are lost on exit");
            Ok(Arc::new(InMemorySecretStore::new()))
        }
        #[cfg(feature = "gcp")]
        StoreKind::Gcp => {
            let store = secret_rotator::secrets::backends::GcpSecretStore::from_env()
                .await
                .context("Failed to create GCP Secret Manager client")?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "gcp"))]
        StoreKind::Gcp => {
            anyhow::bail!("--store gcp requires a build with the `gcp` feature")
        }
    }
}

/// Provisioners that fail to initialise are left out; secrets of their type
/// then fail individually with a missing provisioner error.
async fn build_registry(settings: &AppSettings) -> ProvisionerRegistry {
    let mut registry = ProvisionerRegistry::new();
    registry.register(Arc::new(RandomProvisioner::new()));

    #[cfg(feature = "gcp")]
    {
        use secret_rotator::provisioners::ServiceAccountKeyProvisioner;

        match ServiceAccountKeyProvisioner::new(settings.enable_deletion).await {
            Ok(provisioner) => registry.register(Arc::new(provisioner)),
            Err(e) => error!(error = %e, "Failed to create service account key provisioner"),
        }
    }
    #[cfg(not(feature = "gcp"))]
    let _ = settings;

    registry
}

async fn print_plan(rotator: &SecretRotator) -> anyhow::Result<()> {
    let plans = rotator.plan_once().await;

    let rendered: serde_json::Map<String, serde_json::Value> = plans
        .into_iter()
        .map(|(name, planned)| {
            let value = match planned {
                Ok(actions) => serde_json::json!({ "actions": actions }),
                Err(e) => serde_json::json!({ "error": e.to_string() }),
            };
            (name, value)
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&rendered).context("Failed to render plan")?);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
