//! Schema for the rate window table.

use ::duckdb::Connection;

/// Idempotently creates the rate window table and its score index.
pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS rate_window_entries (
             key VARCHAR NOT NULL,
             score BIGINT NOT NULL,
             member VARCHAR NOT NULL,
             PRIMARY KEY (key, member)
         );
         CREATE INDEX IF NOT EXISTS idx_rate_window_key_score
             ON rate_window_entries (key, score);",
    )
}
