//! JobPulse automation core (spec §1-§2): a single long-running process
//! that drives the Freshness Engine (C1-C4) and Vetting Engine (C5-C12)
//! off one scheduler and reports C13 health over a minimal HTTP surface.
//!
//! Usage:
//!     jobpulse --environment production

mod cron;
mod health_http;
mod wiring;

use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "jobpulse", about = "JobPulse freshness + vetting automation core")]
struct Args {
    /// Logical environment scoping scheduler locks so prod and staging
    /// replicas never contend for the same cycle (spec §4.1).
    #[arg(long, env = "JOBPULSE_ENVIRONMENT", default_value = "production")]
    environment: String,

    /// Verbose console logging (mirrors the file log level instead of
    /// warn-and-above).
    #[arg(long)]
    verbose: bool,

    /// TCP port for the health/readiness/cron HTTP surface (spec §4.13, §6.4).
    #[arg(long, default_value_t = 8080)]
    http_port: u16,

    /// Grace period for in-flight cycle handlers on shutdown.
    #[arg(long, default_value_t = 30)]
    shutdown_grace_seconds: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    jobpulse_logging::init_logging(jobpulse_logging::LogConfig {
        app_name: "jobpulse",
        verbose: args.verbose,
        quiet_console: false,
    })?;

    tracing::info!(environment = %args.environment, "starting jobpulse");

    let config = std::sync::Arc::new(jobpulse_core::Config::from_env()?);
    let pool = jobpulse_db::open(&config.database_url).await?;

    let built = wiring::build(config.clone(), pool.clone(), &args.environment).await?;

    let http_server = tokio::spawn(health_http::serve(
        args.http_port,
        built.health.clone(),
        built.digest_handler.clone(),
        config.cron_bearer_secret.clone(),
    ));

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, stopping scheduler");

    built.scheduler.stop(Duration::from_secs(args.shutdown_grace_seconds)).await;
    http_server.abort();

    tracing::info!("jobpulse stopped cleanly");
    Ok(())
}

/// Waits for either Ctrl-C or, on Unix, SIGTERM — the signal container
/// orchestrators (Docker, Kubernetes) send on `docker stop`/pod eviction.
#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to install SIGTERM handler, falling back to Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
