//! Production wiring: Postgres repositories, the signed marking client, the
//! Robokassa adapter, background jobs and the HTTP server.

use crate::config::Config;
use crate::db::{self, PgStore};
use crate::health::{ArtifactDirChecker, HealthChecker, MarkingCredentialsChecker, PostgresChecker};
use crate::marking::{CodeIssuer, MarkingClient, RequestSigner, UnconfiguredIssuer};
use crate::metrics::Metrics;
use crate::middleware::RateLimiter;
use crate::robokassa::RobokassaGateway;
use crate::services::housekeeping::run_housekeeping;
use crate::services::{ArtifactStore, CodeRetryJob, FixedPricing};
use crate::use_cases::RetryPolicy;
use crate::{create_app, AppState, Dependencies};
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;

/// Loads the signer when both credential paths are configured. A broken key
/// or certificate file is a startup error, missing paths are not.
pub fn build_issuer(config: &Config) -> anyhow::Result<Arc<dyn CodeIssuer>> {
    let marking = &config.marking;
    match (&marking.private_key_path, &marking.certificate_path) {
        (Some(key_path), Some(certificate_path)) => {
            let signer = RequestSigner::from_files(key_path, certificate_path)
                .context("failed to load marking API credentials")?;
            tracing::info!(base_url = %marking.base_url, "Marking API client configured");
            Ok(Arc::new(MarkingClient::new(
                marking.base_url.clone(),
                signer,
                marking.timeout,
            )))
        }
        _ => {
            tracing::warn!("Marking API credentials missing, code requests will stay pending");
            Ok(Arc::new(UnconfiguredIssuer))
        }
    }
}

/// Builds the dependency set over a connected pool.
pub fn build_dependencies(config: &Config, pool: sqlx::PgPool) -> anyhow::Result<Dependencies> {
    let store = Arc::new(PgStore::new(pool.clone()));
    let issuer = build_issuer(config)?;
    let gateway = RobokassaGateway::new(&config.robokassa).context("invalid Robokassa configuration")?;
    let metrics = Metrics::new().context("failed to register metrics")?;
    let artifacts = ArtifactStore::new(config.artifacts.dir.clone());

    let health_checker = HealthChecker::new()
        .add_checker(Box::new(PostgresChecker::new(pool)))
        .add_checker(Box::new(ArtifactDirChecker::new(config.artifacts.dir.clone())))
        .add_checker(Box::new(MarkingCredentialsChecker::new(
            config.marking.is_configured(),
        )));

    Ok(Dependencies {
        users: store.clone(),
        orders: store.clone(),
        payments: store.clone(),
        code_requests: store,
        issuer,
        pricing: Arc::new(FixedPricing::from_config(&config.pricing)),
        gateway,
        artifacts,
        metrics,
        health_checker: Arc::new(health_checker),
        retry_policy: RetryPolicy::from_config(config),
        currency: config.robokassa.currency.clone(),
        rate_limiter: RateLimiter::from_config(&config.rate_limit),
        cors_allowed_origins: config.cors_allowed_origins.clone(),
    })
}

pub fn code_retry_job(config: &Config, deps: &Dependencies) -> CodeRetryJob {
    CodeRetryJob::new(
        deps.code_requests.clone(),
        deps.fulfilment(),
        deps.retry_policy,
        config.code_retry.batch_size,
    )
}

/// Runs migrations, starts the background jobs and serves until Ctrl-C.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config)
        .await
        .context("failed to connect to Postgres")?;
    db::run_migrations(&pool).await.context("failed to run migrations")?;

    let deps = build_dependencies(&config, pool)?;
    if let Err(e) = deps.artifacts.ensure_dir().await {
        tracing::warn!("Artifact directory unavailable: {}", e);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let retry_job = code_retry_job(&config, &deps);
    let retry_handle = tokio::spawn(retry_job.run(config.code_retry.interval, shutdown_rx.clone()));
    let housekeeping_handle = tokio::spawn(run_housekeeping(
        config.artifacts.dir.clone(),
        config.artifacts.ttl,
        shutdown_rx,
    ));

    let app = create_app(AppState::new(deps));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(retry_handle, housekeeping_handle);
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
