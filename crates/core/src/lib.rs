//! Course outline and progress model, plus the navigator that derives a
//! learner's position and enforces chapter exam gating.

#![forbid(unsafe_code)]

pub mod error;
pub mod model;
pub mod navigator;
pub mod time;

pub use error::Error;
pub use navigator::{AdvanceOutcome, Navigator, Position, ProgressSummary};
pub use time::Clock;
