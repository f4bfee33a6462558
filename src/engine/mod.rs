//! Term rollover engine.
//!
//! `registry` owns the session lifecycle, `executor::run_rollover` performs the
//! atomic close, and `report::assemble` turns its result into the report model.

pub mod archive;
pub mod classify;
pub mod error;
pub mod executor;
pub mod model;
pub mod registry;
pub mod report;
pub mod stats;
pub mod store;

pub use error::{ReportError, RolloverError, RolloverStep, StoreError};
pub use executor::{run_rollover, RolloverOptions, TransitionResult};
pub use registry::SessionPhase;
pub use report::{assemble, SessionReport, TransitionSummary};
