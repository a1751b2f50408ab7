pub mod error;
mod store;
mod writer;

pub use error::{Result, StoreError};
pub use store::{MetricsRow, StateStore, SuccessOutcome};
pub use writer::FailureUpdate;
