//! Execution engine front end for keel
//!
//! The engine orchestrates:
//! 1. Previewing - ask the reconciler what would change
//! 2. Confirming - show the plan and wait for the user
//! 3. Converging - run the reconciler with progress and a final report

pub mod differ;
pub mod executor;

pub use executor::{ApplyOptions, Outcome, execute, finish};
