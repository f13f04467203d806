use thiserror::Error;

/// Errors raised by the decision engine and state-machine layer.
///
/// Pure domain errors only — I/O failures (database, driver, network) are
/// modeled by their own error types in `castellum-db` / `castellum-drivers`
/// and never surface here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CastellumError {
    #[error("resource logic is invalid: {0}")]
    InvalidResourceLogic(String),

    #[error("asset status is invalid: {0}")]
    InvalidAssetStatus(String),

    #[error("no pending operation exists for this asset")]
    NoPendingOperation,

    #[error("pending operation for reason {existing:?} cannot transition directly to {requested:?} from state {state}")]
    IllegalTransition {
        existing: crate::model::Reason,
        requested: crate::model::Reason,
        state: &'static str,
    },
}
