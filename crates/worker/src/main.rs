use std::sync::Arc;

use jobrunner::api;
use jobrunner::config;
use jobrunner::db;
use jobrunner::jobs::bodies::{AvatarMigrateJob, UpdateProRevocationListJob, UserSyncJob};
use jobrunner::jobs::{RunnerRegistry, SqliteQueueStore};
use jobrunner::telemetry;
use tracing::{error, info, warn};

mod handlers;
use handlers::demo_services;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::Config::from_env()?;
    telemetry::init(cfg.log_json);

    info!(
        database_url = %cfg.database_url,
        admin = %cfg.admin_addr.clone().unwrap_or_else(|| "disabled".to_string()),
        migrate_on_startup = cfg.migrate_on_startup,
        persist_max_attempts = cfg.persist_max_attempts,
        shutdown_grace_ms = cfg.shutdown_grace_ms,
        "jobrunner worker starting"
    );

    let pool = db::make_pool(&cfg.database_url).await?;
    if cfg.migrate_on_startup {
        db::run_migrations(&pool).await?;
    }

    let store = Arc::new(SqliteQueueStore::new(pool));
    let services = Arc::new(demo_services());
    let registry = RunnerRegistry::start(store, services, cfg.runner_config()).await?;

    // startup work the application queues on every launch
    if let Err(e) = UserSyncJob::queue_new_job_if_needed(&registry).await {
        warn!(error = %e, "could not queue user sync");
    }
    if let Err(e) = UpdateProRevocationListJob::queue_new_job_if_needed(&registry).await {
        warn!(error = %e, "could not queue pro revocation refresh");
    }
    if let Err(e) = AvatarMigrateJob::schedule_all(&registry).await {
        warn!(error = %e, "could not schedule avatar migrations");
    }

    // ---- API task ----
    let api_handle = match cfg.admin_addr.clone() {
        Some(addr) => {
            let app = api::router(api::ApiState {
                registry: registry.clone(),
            });
            Some(tokio::spawn(async move {
                let listener = tokio::net::TcpListener::bind(&addr).await?;
                info!("admin api listening on http://{addr}");
                axum::serve(listener, app).await?;
                Ok::<(), anyhow::Error>(())
            }))
        }
        None => None,
    };

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    registry.shutdown().await;
    if let Some(handle) = api_handle {
        handle.abort();
        if let Ok(Err(e)) = handle.await {
            error!(error = %e, "admin api failed");
        }
    }
    Ok(())
}
