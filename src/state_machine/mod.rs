//! Run and stage state definitions.
//!
//! Both enums are persisted as lowercase text and every transition the
//! orchestrator performs is a conditional single-row update from an explicit
//! set of allowed source states.

pub mod states;

pub use states::{RunStatus, StageStatus};
