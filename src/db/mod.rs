use crate::error::AppError;
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use std::path::{Path, PathBuf};

const DEFAULT_DB_FILENAME: &str = "quote-desk.db";

fn resolve_db_filename() -> String {
    std::env::var("APP_DB_FILENAME")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_DB_FILENAME.to_string())
}

fn resolve_data_dir() -> PathBuf {
    std::env::var("QUOTE_DESK_DATA_DIR")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// An explicit path wins; otherwise the file lives in `QUOTE_DESK_DATA_DIR`
/// (or the working directory) under `APP_DB_FILENAME`.
pub fn resolve_db_path(explicit: Option<&Path>) -> Result<PathBuf, AppError> {
    if let Some(path) = explicit {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        return Ok(path.to_path_buf());
    }

    let mut base_dir = resolve_data_dir();
    std::fs::create_dir_all(&base_dir)?;
    base_dir.push(resolve_db_filename());
    Ok(base_dir)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), AppError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn initialize_pool_from_path(path: &Path) -> Result<SqlitePool, AppError> {
    let connect_options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePool::connect_with(connect_options).await?;
    run_migrations(&pool).await?;

    Ok(pool)
}

pub async fn initialize_pool(explicit: Option<&Path>) -> Result<SqlitePool, AppError> {
    let db_path = resolve_db_path(explicit)?;
    tracing::info!(path = %db_path.display(), "opening database");
    initialize_pool_from_path(&db_path).await
}
