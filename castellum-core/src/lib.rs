//! Pure domain core for Castellum: the data model, the threshold-crossing
//! decision engine, and the pending-operation state machine. No I/O lives
//! here — persistence, driver calls, and the HTTP surface are all built on
//! top of these types in the sibling crates.

pub mod engine;
pub mod error;
pub mod model;
pub mod state_machine;

pub use engine::{decide, Eligibility};
pub use error::CastellumError;
pub use model::{
    Asset, AssetStatus, FinishedOperation, Outcome, PendingOperation, PendingState, Reason,
    Resource, ResourceLogic, StepRule, ThresholdSet, Usage,
};
pub use state_machine::{transition, StateAction};
