use thiserror::Error;

/// Errors a driver call can raise. The caller (resource/asset scraper,
/// resize executor) decides what to do with each variant — see spec §7.
#[derive(Error, Debug, Clone)]
pub enum DriverError {
    /// Transient infrastructure fault: network timeout, 5xx, connection
    /// reset. Maps to a retryable `errored` outcome.
    #[error("transient driver fault: {0}")]
    Transient(String),
    /// User-attributable rejection the driver can identify directly (quota
    /// exceeded, asset not resizable). Maps to a terminal `failed` outcome.
    #[error("permanent driver fault: {0}")]
    Permanent(String),
    /// `check_resource_allowed` rejected the resource configuration.
    #[error("resource configuration rejected: {0}")]
    ConfigRejected(String),
    /// The asset-type is not what this driver was registered for.
    #[error("asset-type mismatch: expected {expected}, got {got}")]
    AssetTypeMismatch { expected: String, got: String },
}
