//! Tenantry Server: application entry point.

use std::process::ExitCode;
use std::sync::Arc;

use tenantry_server::{ServerConfig, Tenantry, telemetry};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };
    telemetry::init_tracing();

    info!("Starting Tenantry server...");

    let app = match Tenantry::connect(&config).await {
        Ok(app) => Arc::new(app),
        Err(e) => {
            error!(error = %e, "Could not connect to SurrealDB");
            return ExitCode::FAILURE;
        }
    };
    info!(
        namespace = %config.db.namespace,
        pool_size = app.router().pool().size(),
        "Tenantry ready"
    );

    let replay = (!config.audit_replay_interval.is_zero()).then(|| {
        let app = Arc::clone(&app);
        let period = config.audit_replay_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let recorder = app.audit().recorder();
                if recorder.dead_letter_count() > 0 {
                    let written = recorder.replay_dead_letters().await;
                    info!(written, "Replayed dead-lettered audit entries");
                }
            }
        })
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Could not listen for shutdown signal");
    }

    info!("Shutting down");
    if let Some(task) = replay {
        task.abort();
    }
    app.shutdown().await;

    info!("Tenantry server stopped.");
    ExitCode::SUCCESS
}
