//! # Orchestration
//!
//! Two strategies drive a project's pipeline behind the [`Orchestrator`]
//! interface:
//!
//! - [`DagOrchestrator`]: walks a [`PipelineTemplate`](crate::models::PipelineTemplate)
//!   DAG, starting every stage whose dependencies are completed or skipped.
//! - [`LegacyOrchestrator`]: the hand-written chain for the built-in default
//!   template, mirrored into a DAG run for observability.
//!
//! [`OrchestratorDispatcher`] selects between them per project.

pub mod bootstrap;
pub mod dag_orchestrator;
pub mod dispatcher;
pub mod legacy_orchestrator;
pub mod stage_names;
pub mod types;

pub use bootstrap::PipelineSystem;
pub use dag_orchestrator::DagOrchestrator;
pub use dispatcher::{should_use_generic_orchestrator, OrchestratorDispatcher};
pub use legacy_orchestrator::LegacyOrchestrator;
pub use stage_names::{legacy_to_stage_id, stage_id_to_legacy, LegacyStage};
pub use types::{
    AdvanceOutcome, AdvanceReport, ExecutionMode, Orchestrator, OrchestratorDeps, StageLaunch,
};
