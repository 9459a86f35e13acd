//! Background maintenance jobs.
//!
//! - `run_stuck_scan`: one pass of the stuck-purpose rule (used by the
//!   one-shot binary and the admin endpoint)
//! - `StuckPurposeRunner`: the same pass on a schedule inside the API process

pub mod stuck_purposes;

pub use stuck_purposes::{StuckPurposeRunner, StuckPurposeRunnerHandle, run_stuck_scan};
