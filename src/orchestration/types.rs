//! # Orchestration Types
//!
//! Outcomes and shared dependencies of the two orchestration strategies, and
//! the [`Orchestrator`] interface the dispatcher selects between.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::OrchestrationResult;
use crate::messaging::JobQueue;
use crate::models::StageProgress;
use crate::registry::StageHandlerRegistry;
use crate::store::{PipelineStore, ProjectStore};
use crate::templates::TemplateCatalog;

/// Whether the DAG engine owns the project or only records progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Updates project status and enqueues stage jobs
    Dispatch,
    /// Shadows the legacy chain: stage bookkeeping only, no jobs and no
    /// project status writes
    Mirror,
}

/// Stages started or skipped by one advancement walk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceReport {
    pub started: Vec<String>,
    pub skipped: Vec<String>,
    pub run_completed: bool,
    /// Set when a stage could not start and the run was failed
    pub run_failed: Option<String>,
}

/// Result of a completion report from a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdvanceOutcome {
    ProjectMissing,
    NoActiveRun,
    /// The run names a template the catalog no longer holds
    TemplateMissing { template_slug: String },
    UnknownStage { stage_id: String },
    /// The stage was already settled by an earlier report
    AlreadySettled { stage_id: String },
    /// Jobs of the stage are still outstanding
    Waiting(StageProgress),
    RunFailed { reason: String },
    Advanced(AdvanceReport),
}

impl AdvanceOutcome {
    pub fn is_advanced(&self) -> bool {
        matches!(self, AdvanceOutcome::Advanced(_))
    }

    pub fn report(&self) -> Option<&AdvanceReport> {
        match self {
            AdvanceOutcome::Advanced(report) => Some(report),
            _ => None,
        }
    }
}

/// What happened when a stage was asked to start
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageLaunch {
    Started { job_count: usize },
    /// No handler is registered, so the stage was marked skipped
    Skipped,
    /// The handler found nothing it could ever complete; the run was failed
    Failed { reason: String },
    /// Another caller already moved the stage out of `pending`
    AlreadyClaimed,
}

/// Collaborators shared by every orchestrator instance
#[derive(Clone)]
pub struct OrchestratorDeps {
    pub pipelines: Arc<dyn PipelineStore>,
    pub projects: Arc<dyn ProjectStore>,
    pub queue: Arc<dyn JobQueue>,
    pub registry: Arc<StageHandlerRegistry>,
    pub templates: Arc<TemplateCatalog>,
}

impl std::fmt::Debug for OrchestratorDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorDeps")
            .field("registry", &self.registry)
            .field("templates", &self.templates.len())
            .finish()
    }
}

/// A pipeline strategy: start a project's pipeline and react to stage
/// completion reports.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start a pipeline for the project, returning the run id when a run
    /// record was created
    async fn start(&self, project_id: Uuid, user_id: Uuid) -> OrchestrationResult<Option<Uuid>>;

    /// Handle a worker's report that a job of `completed_stage` finished
    async fn advance(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        completed_stage: &str,
    ) -> OrchestrationResult<AdvanceOutcome>;
}
