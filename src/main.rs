use anyhow::{Context, Result};
use artifact_repo::{
    config::{self, Mode},
    handlers::AppState,
    routes,
    server::Server,
    services::{
        application::Application, metadata_store::SqliteMetadataStore, object_store,
        reconcile::Reconciler, repository::Repository,
    },
};
use std::{path::Path, sync::Arc};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + run mode ---
    let (cfg, mode) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting artifact-repo with config: {:?}", cfg);

    // --- Create parent directory of the SQLite file if needed ---
    let db_path = cfg
        .database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    // --- Connect metadata store (retried, startup only) ---
    let metadata = SqliteMetadataStore::connect_with_retry(
        &cfg.database_url,
        cfg.max_connections,
        cfg.connect_attempts,
        cfg.connect_delay,
    )
    .await
    .context("connecting to metadata store")?;

    metadata
        .migrate()
        .await
        .context("running database migrations")?;
    tracing::info!("Database migration complete.");

    // --- Handle migration mode ---
    if mode == Mode::Migrate {
        return Ok(()); // exit after migration
    }

    // --- Object store ---
    let built = object_store::from_config(&cfg.storage)
        .await
        .context("building object store")?;

    let repository = Repository::new(Arc::new(metadata), built.store)
        .with_deadline(cfg.operation_timeout);

    // --- Handle reconcile mode ---
    if let Mode::Reconcile { sweep } = mode {
        let reconciler = Reconciler::new(&repository);
        let report = if sweep {
            reconciler.sweep().await
        } else {
            reconciler.scan().await
        }
        .context("reconciling stores")?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    // --- Build router ---
    let state = AppState::new(
        Application::new(repository),
        built.filesystem,
        cfg.upload_dir.clone(),
    );
    let app = routes::routes::routes().with_state(state);

    // --- Start server, stop on ctrl-c ---
    let server = Server::new(app);
    server.start(&cfg.addr()).await?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("Shutdown signal received");
    server.stop().await?;

    Ok(())
}
