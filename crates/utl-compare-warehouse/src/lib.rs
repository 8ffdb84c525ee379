//! # utl-compare Warehouse
//!
//! DuckDB storage for sliding-window rate limit counters.
//!
//! Each accepted request is one row `(key, score, member)` where `score` is
//! the acceptance time in Unix milliseconds. The store exposes the three
//! primitives the limiter needs, each a single statement and therefore
//! atomic on its own:
//!
//! | Operation | SQL |
//! |-----------|-----|
//! | [`CounterWarehouse::count_in_range`] | `SELECT COUNT(*) ... WHERE score BETWEEN ? AND ?` |
//! | [`CounterWarehouse::insert`] | `INSERT ... ON CONFLICT DO NOTHING` |
//! | [`CounterWarehouse::prune_below`] | `DELETE ... WHERE score < ?` |
//!
//! ## Sharing the file
//!
//! `DuckDB` lets one process at a time hold a database file for writing. A
//! file-backed warehouse therefore opens a connection per operation and
//! closes it straight after, so a long-running server and short CLI runs can
//! use the same counters. Opening retries briefly while another process holds
//! the file lock and then gives up with [`WarehouseError::Busy`]. Within one
//! process, operations on the same file are serialized.
//!
//! ```rust,no_run
//! use utl_compare_warehouse::{CounterWarehouse, WarehouseConfig};
//!
//! let warehouse = CounterWarehouse::open(WarehouseConfig::default())?;
//! warehouse.insert("rate:127.0.0.1:f1_score", 1_700_000_000_000, "a1")?;
//! let seen = warehouse.count_in_range("rate:127.0.0.1:f1_score", 0, i64::MAX)?;
//! assert_eq!(seen, 1);
//! # Ok::<(), utl_compare_warehouse::WarehouseError>(())
//! ```

pub mod migrations;

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::Duration;

use ::duckdb::{params, Connection};
use thiserror::Error;
use tracing::debug;

/// Tries per connection before a held file lock is reported as busy.
pub const LOCK_RETRY_ATTEMPTS: u32 = 5;

/// Linear backoff step between lock retries.
pub const LOCK_RETRY_STEP: Duration = Duration::from_millis(25);

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Another process kept the database file locked through every retry.
    #[error("counter database '{}' is locked by another process after {attempts} attempts", path.display())]
    Busy { path: PathBuf, attempts: u32 },

    /// A previous holder of the connection panicked.
    #[error("counter warehouse connection lock poisoned")]
    Poisoned,
}

/// Location of the counter database.
///
/// The default file is `counters.duckdb` under `UTL_COMPARE_HOME`, falling
/// back to `$HOME/.utl-compare`.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self::at(resolve_home().join("counters.duckdb"))
    }
}

impl WarehouseConfig {
    /// Uses an explicit database path.
    pub fn at(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }
}

#[derive(Clone)]
enum Backing {
    File { path: PathBuf, gate: Arc<Mutex<()>> },
    Memory(Arc<Mutex<Connection>>),
}

/// Rate window counters persisted in `DuckDB`.
#[derive(Clone)]
pub struct CounterWarehouse {
    backing: Backing,
}

impl CounterWarehouse {
    /// Open (creating if needed) the database at `config.db_path`.
    ///
    /// The schema is applied once here; no connection is kept afterwards.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let path = config.db_path;
        let gate = gate_for(&path);
        {
            let _serialized = gate.lock().map_err(|_| WarehouseError::Poisoned)?;
            let connection = open_connection(&path)?;
            migrations::apply_migrations(&connection)?;
        }
        debug!(path = %path.display(), "counter warehouse opened");

        Ok(Self {
            backing: Backing::File { path, gate },
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, WarehouseError> {
        let connection = Connection::open_in_memory()?;
        migrations::apply_migrations(&connection)?;
        Ok(Self {
            backing: Backing::Memory(Arc::new(Mutex::new(connection))),
        })
    }

    /// Database file path, `None` for in-memory stores.
    pub fn db_path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::File { path, .. } => Some(path.as_path()),
            Backing::Memory(_) => None,
        }
    }

    /// Number of entries for `key` with `min <= score <= max`.
    pub fn count_in_range(&self, key: &str, min: i64, max: i64) -> Result<u64, WarehouseError> {
        let count: i64 = self.with_connection(|connection| {
            connection.query_row(
                "SELECT COUNT(*) FROM rate_window_entries WHERE key = ? AND score BETWEEN ? AND ?",
                params![key, min, max],
                |row| row.get(0),
            )
        })?;
        Ok(count.max(0) as u64)
    }

    /// Record `member` under `key` at `score`. Re-inserting a member is a no-op.
    pub fn insert(&self, key: &str, score: i64, member: &str) -> Result<(), WarehouseError> {
        self.with_connection(|connection| {
            connection.execute(
                "INSERT INTO rate_window_entries (key, score, member) VALUES (?, ?, ?) \
                 ON CONFLICT DO NOTHING",
                params![key, score, member],
            )
        })?;
        Ok(())
    }

    /// Delete entries for `key` with `score < threshold`; returns how many went.
    pub fn prune_below(&self, key: &str, threshold: i64) -> Result<u64, WarehouseError> {
        let removed = self.with_connection(|connection| {
            connection.execute(
                "DELETE FROM rate_window_entries WHERE key = ? AND score < ?",
                params![key, threshold],
            )
        })?;
        Ok(removed as u64)
    }

    fn with_connection<T>(
        &self,
        call: impl FnOnce(&Connection) -> Result<T, ::duckdb::Error>,
    ) -> Result<T, WarehouseError> {
        match &self.backing {
            Backing::Memory(connection) => {
                let connection = connection.lock().map_err(|_| WarehouseError::Poisoned)?;
                Ok(call(&connection)?)
            }
            Backing::File { path, gate } => {
                let _serialized = gate.lock().map_err(|_| WarehouseError::Poisoned)?;
                let connection = open_connection(path)?;
                Ok(call(&connection)?)
            }
        }
    }
}

/// Open a connection, retrying while another process holds the file lock.
fn open_connection(path: &Path) -> Result<Connection, WarehouseError> {
    let mut attempt = 1;
    loop {
        match Connection::open(path) {
            Ok(connection) => {
                connection.execute_batch("PRAGMA disable_progress_bar;")?;
                return Ok(connection);
            }
            Err(error) if is_lock_conflict(&error) => {
                if attempt >= LOCK_RETRY_ATTEMPTS {
                    return Err(WarehouseError::Busy {
                        path: path.to_path_buf(),
                        attempts: attempt,
                    });
                }
                debug!(path = %path.display(), attempt, "counter database locked, retrying");
                thread::sleep(LOCK_RETRY_STEP * attempt);
                attempt += 1;
            }
            Err(error) => return Err(error.into()),
        }
    }
}

fn is_lock_conflict(error: &::duckdb::Error) -> bool {
    let message = error.to_string();
    message.contains("Could not set lock") || message.contains("Conflicting lock")
}

/// One gate per database file for the whole process, so two warehouses
/// opened on the same path never run statements side by side.
fn gate_for(path: &Path) -> Arc<Mutex<()>> {
    static GATES: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();

    let identity = canonical_file_path(path);
    let mut gates = GATES
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    Arc::clone(gates.entry(identity).or_default())
}

fn canonical_file_path(path: &Path) -> PathBuf {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match (fs::canonicalize(parent), path.file_name()) {
        (Ok(parent), Some(name)) => parent.join(name),
        _ => path.to_path_buf(),
    }
}

fn resolve_home() -> PathBuf {
    if let Some(path) = env::var_os("UTL_COMPARE_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".utl-compare");
    }

    PathBuf::from(".utl-compare")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn counts_only_entries_inside_range_for_the_key() {
        let warehouse = CounterWarehouse::open_in_memory().expect("open");

        warehouse.insert("rate:a:f1_score", 100, "m1").expect("insert");
        warehouse.insert("rate:a:f1_score", 200, "m2").expect("insert");
        warehouse.insert("rate:a:f1_score", 300, "m3").expect("insert");
        warehouse.insert("rate:b:f1_score", 200, "m4").expect("insert");

        assert_eq!(warehouse.count_in_range("rate:a:f1_score", 150, 300).expect("count"), 2);
        assert_eq!(warehouse.count_in_range("rate:b:f1_score", 0, 1_000).expect("count"), 1);
        assert_eq!(warehouse.count_in_range("rate:c:f1_score", 0, 1_000).expect("count"), 0);
    }

    #[test]
    fn duplicate_member_is_ignored() {
        let warehouse = CounterWarehouse::open_in_memory().expect("open");

        warehouse.insert("k", 100, "same").expect("insert");
        warehouse.insert("k", 100, "same").expect("second insert is a no-op");

        assert_eq!(warehouse.count_in_range("k", 0, 1_000).expect("count"), 1);
    }

    #[test]
    fn prune_is_strictly_below_threshold() {
        let warehouse = CounterWarehouse::open_in_memory().expect("open");

        warehouse.insert("k", 99, "old").expect("insert");
        warehouse.insert("k", 100, "edge").expect("insert");
        warehouse.insert("k", 101, "new").expect("insert");

        assert_eq!(warehouse.prune_below("k", 100).expect("prune"), 1);
        assert_eq!(warehouse.count_in_range("k", 0, 1_000).expect("count"), 2);
    }

    #[test]
    fn counters_survive_reopening_the_file() {
        let temp = tempdir().expect("tempdir");
        let db_path = temp.path().join("state").join("counters.duckdb");

        {
            let warehouse = CounterWarehouse::open(WarehouseConfig::at(&db_path)).expect("open");
            warehouse.insert("k", 1, "m").expect("insert");
        }

        let reopened = CounterWarehouse::open(WarehouseConfig::at(&db_path)).expect("reopen");
        assert_eq!(reopened.count_in_range("k", 0, 10).expect("count"), 1);
        assert_eq!(reopened.db_path(), Some(db_path.as_path()));
    }

    #[test]
    fn same_file_can_be_held_open_twice() {
        let temp = tempdir().expect("tempdir");
        let db_path = temp.path().join("counters.duckdb");

        let server = CounterWarehouse::open(WarehouseConfig::at(&db_path)).expect("first open");
        let cli = CounterWarehouse::open(WarehouseConfig::at(&db_path)).expect("second open");

        server.insert("k", 10, "from-server").expect("insert");
        cli.insert("k", 20, "from-cli").expect("insert");

        assert_eq!(server.count_in_range("k", 0, 100).expect("count"), 2);
        assert_eq!(cli.prune_below("k", 15).expect("prune"), 1);
        assert_eq!(server.count_in_range("k", 0, 100).expect("count"), 1);
    }

    #[test]
    fn concurrent_writers_on_one_file_all_land() {
        let temp = tempdir().expect("tempdir");
        let db_path = temp.path().join("counters.duckdb");
        let first = CounterWarehouse::open(WarehouseConfig::at(&db_path)).expect("open");
        let second = CounterWarehouse::open(WarehouseConfig::at(&db_path)).expect("open");

        thread::scope(|scope| {
            for (name, warehouse) in [("a", &first), ("b", &second)] {
                scope.spawn(move || {
                    for index in 0..5 {
                        warehouse
                            .insert("k", index, &format!("{name}-{index}"))
                            .expect("insert");
                    }
                });
            }
        });

        assert_eq!(first.count_in_range("k", 0, 10).expect("count"), 10);
    }

    #[test]
    fn default_config_names_the_counter_file() {
        let config = WarehouseConfig::default();
        assert_eq!(
            config.db_path.file_name().and_then(|name| name.to_str()),
            Some("counters.duckdb")
        );
    }
}
