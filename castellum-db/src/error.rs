use thiserror::Error;

/// Database-layer error. Workers treat every variant as a loop-level fault
/// (log, count, let the lease expire and retry); the API maps it to 500
/// (spec §7 "Database fault").
#[derive(Error, Debug)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("malformed usage/threshold JSON: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("unrecognised stored value in {column}: {value:?}")]
    InvalidEnumValue { column: &'static str, value: String },
    #[error("row for {what} {id} vanished between lease and read")]
    LeaseVanished { what: &'static str, id: String },
}
