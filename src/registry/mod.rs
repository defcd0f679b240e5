//! # Registry
//!
//! Stage handler lookup, constructed once at startup and injected into the
//! orchestrators.

pub mod stage_handler_registry;

pub use stage_handler_registry::{default_registry, StageHandlerRegistry};
