//! Database bootstrap: location, pool, migrations and the column codecs
//! shared by every repository.

pub mod write_actor;

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use diesel::connection::SimpleConnection;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::{Connection, SqliteConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::info;
use rust_decimal::Decimal;

use ledgerline_core::errors::{DatabaseError, Error, Result};
use ledgerline_core::sync::parse_timestamp;

use crate::errors::StorageError;

pub use write_actor::{spawn_writer, WriteHandle};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Overrides the database file location when set.
pub const DB_PATH_ENV: &str = "LEDGERLINE_DB_PATH";

const DB_FILE_NAME: &str = "ledgerline.db";
const POOL_MAX_SIZE: u32 = 8;
const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Timestamps are stored as fixed-width UTC text so lexical order is chronological.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Resolves the database path inside `app_data_dir`, creating the directory.
pub fn init(app_data_dir: &str) -> Result<String> {
    if let Some(path) = std::env::var(DB_PATH_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
    {
        if let Some(parent) = Path::new(&path).parent() {
            create_dir(parent)?;
        }
        return Ok(path);
    }

    let dir = Path::new(app_data_dir);
    create_dir(dir)?;
    Ok(dir.join(DB_FILE_NAME).to_string_lossy().to_string())
}

fn create_dir(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|err| {
        Error::Database(DatabaseError::ConnectionFailed(format!(
            "Cannot create {}: {}",
            dir.display(),
            err
        )))
    })
}

#[derive(Debug)]
struct ConnectionOptions;

impl CustomizeConnection<SqliteConnection, r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {};",
            BUSY_TIMEOUT_MS
        ))
        .map_err(r2d2::Error::QueryError)
    }
}

pub fn create_pool(db_path: &str) -> Result<Arc<DbPool>> {
    let manager = ConnectionManager::<SqliteConnection>::new(db_path);
    let pool = Pool::builder()
        .max_size(POOL_MAX_SIZE)
        .connection_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))
        .connection_customizer(Box::new(ConnectionOptions))
        .build(manager)
        .map_err(StorageError::from)?;
    Ok(Arc::new(pool))
}

pub fn get_connection(pool: &DbPool) -> Result<DbConnection> {
    Ok(pool.get().map_err(StorageError::from)?)
}

pub fn run_migrations(db_path: &str) -> Result<()> {
    let mut conn = SqliteConnection::establish(db_path).map_err(StorageError::from)?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|err| StorageError::MigrationFailed(err.to_string()))?;
    if !applied.is_empty() {
        info!("Applied {} database migration(s)", applied.len());
    }
    Ok(())
}

pub(crate) fn format_timestamp(value: NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn now_timestamp() -> String {
    format_timestamp(Utc::now().naive_utc())
}

pub(crate) fn parse_db_timestamp(value: &str) -> Result<NaiveDateTime> {
    parse_timestamp(value)
        .ok_or_else(|| StorageError::InvalidValue(format!("bad timestamp '{}'", value)).into())
}

pub(crate) fn format_date(value: NaiveDate) -> String {
    value.format(DATE_FORMAT).to_string()
}

pub(crate) fn parse_db_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|err| StorageError::InvalidValue(format!("bad date '{}': {}", value, err)).into())
}

pub(crate) fn parse_db_decimal(value: &str) -> Result<Decimal> {
    Decimal::from_str(value)
        .map_err(|err| StorageError::InvalidValue(format!("bad decimal '{}': {}", value, err)).into())
}
