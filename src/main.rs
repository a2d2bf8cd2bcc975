use anyhow::Result;
use axum::Router;
use field_storage::{
    config::{AppConfig, Command},
    routes,
    services::{
        reconcile::{ReconciliationEngine, RunMode},
        repository::SqliteRepository,
        s3::S3StoreFactory,
        signer::UploadSigner,
    },
    state::AppState,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{io::ErrorKind, path::Path, process::ExitCode, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + command ---
    let (cfg, command) = AppConfig::from_env_and_args()?;

    tracing::info!(
        host = %cfg.host,
        port = cfg.port,
        database_url = %cfg.database_url,
        ?command,
        "Starting field-storage"
    );

    // --- Initialize SQLite connection ---
    let db_path = cfg
        .database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let options = SqliteConnectOptions::from_str(&cfg.database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?,
    );
    let repo = SqliteRepository::new(db.clone());

    match command {
        Command::Migrate => {
            repo.migrate().await?;
            tracing::info!("Database migration complete.");
            Ok(ExitCode::SUCCESS)
        }
        Command::DeleteUnused { force } => delete_unused(&cfg, repo, force).await,
        Command::Serve => serve(&cfg, repo).await,
    }
}

async fn serve(cfg: &AppConfig, repo: SqliteRepository) -> Result<ExitCode> {
    let signer = UploadSigner::new(cfg.secret.clone(), Arc::new(S3StoreFactory));
    let state = AppState::new(Arc::new(repo), signer);
    let app: Router = routes::routes::routes().with_state(state);

    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(ExitCode::SUCCESS)
}

async fn delete_unused(cfg: &AppConfig, repo: SqliteRepository, force: bool) -> Result<ExitCode> {
    let mode = if force { RunMode::Delete } else { RunMode::DryRun };
    let engine = ReconciliationEngine::new(Arc::new(repo), Arc::new(S3StoreFactory))
        .with_delete_batch_size(cfg.delete_batch_size);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping reconciliation");
            on_signal.cancel();
        }
    });

    let report = engine.run(mode, &cancel).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    for cancelled in report.cancelled_buckets() {
        tracing::warn!(
            bucket = %format!("{}/{}", cancelled.endpoint, cancelled.bucket),
            unreferenced = cancelled.unreferenced.len(),
            deleted = ?cancelled.deleted,
            "reconciliation interrupted, bucket report is partial"
        );
    }
    for failed in report.failed_buckets() {
        tracing::error!(
            bucket = %format!("{}/{}", failed.endpoint, failed.bucket),
            error = failed.error.as_deref().unwrap_or_default(),
            "bucket could not be reconciled"
        );
    }
    tracing::info!(
        unreferenced = report.unreferenced_total(),
        deleted = report.deleted_total(),
        ?mode,
        "Reconciliation finished"
    );
    if mode == RunMode::DryRun
        && report.unreferenced_total() > 0
        && report.cancelled_buckets().next().is_none()
    {
        tracing::info!("Pass --force to delete the unreferenced objects.");
    }

    Ok(ExitCode::from(report.exit_status()))
}
