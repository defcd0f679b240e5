//! # Orchestrator Dispatcher
//!
//! Entry point used by the API and by workers. Picks the strategy for a
//! project from its template id: the built-in default template runs on the
//! legacy chain, every other template on the DAG engine.

use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::dag_orchestrator::DagOrchestrator;
use super::legacy_orchestrator::LegacyOrchestrator;
use super::stage_names::legacy_to_stage_id;
use super::types::{AdvanceOutcome, ExecutionMode, Orchestrator, OrchestratorDeps};
use crate::config::{OrchestrationConfig, QueueConfig};
use crate::error::OrchestrationResult;
use crate::models::RunSummary;
use crate::store::ProjectStore;

/// True when a project on `template_id` is driven by the DAG engine
pub fn should_use_generic_orchestrator(template_id: Option<&str>, default_template_id: &str) -> bool {
    matches!(template_id, Some(id) if id != default_template_id)
}

pub struct OrchestratorDispatcher {
    projects: Arc<dyn ProjectStore>,
    generic: Arc<DagOrchestrator>,
    legacy: Arc<LegacyOrchestrator>,
    default_template_id: String,
}

impl std::fmt::Debug for OrchestratorDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorDispatcher")
            .field("generic", &self.generic)
            .field("legacy", &self.legacy)
            .field("default_template_id", &self.default_template_id)
            .finish()
    }
}

impl OrchestratorDispatcher {
    pub fn new(
        projects: Arc<dyn ProjectStore>,
        generic: Arc<DagOrchestrator>,
        legacy: Arc<LegacyOrchestrator>,
        default_template_id: impl Into<String>,
    ) -> Self {
        Self {
            projects,
            generic,
            legacy,
            default_template_id: default_template_id.into(),
        }
    }

    /// Wire both strategies over the same stores, queue and registry
    pub fn from_deps(
        deps: OrchestratorDeps,
        orchestration: &OrchestrationConfig,
        queues: &QueueConfig,
    ) -> Self {
        let legacy = LegacyOrchestrator::new(
            deps.clone(),
            queues.clone(),
            orchestration.legacy_single_flight,
        );
        Self::new(
            deps.projects.clone(),
            Arc::new(DagOrchestrator::new(deps, ExecutionMode::Dispatch)),
            Arc::new(legacy),
            orchestration.default_template_id.clone(),
        )
    }

    pub fn generic(&self) -> &Arc<DagOrchestrator> {
        &self.generic
    }

    pub fn legacy(&self) -> &Arc<LegacyOrchestrator> {
        &self.legacy
    }

    pub fn should_use_generic_orchestrator(&self, template_id: Option<&str>) -> bool {
        should_use_generic_orchestrator(template_id, &self.default_template_id)
    }

    pub fn orchestrator_for(&self, template_id: Option<&str>) -> &dyn Orchestrator {
        if self.should_use_generic_orchestrator(template_id) {
            self.generic.as_ref()
        } else {
            self.legacy.as_ref()
        }
    }

    pub async fn start_pipeline(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> OrchestrationResult<Option<Uuid>> {
        let Some(project) = self.projects.get_project(project_id).await? else {
            warn!(project_id = %project_id, "Project not found, pipeline not started");
            return Ok(None);
        };

        let orchestrator = self.orchestrator_for(project.template_id.as_deref());
        debug!(project_id = %project_id, orchestrator = orchestrator.name(), "Starting pipeline");
        orchestrator.start(project_id, user_id).await
    }

    /// Route a worker's completion report. Legacy stage names are translated
    /// to DAG stage ids for template-driven projects.
    pub async fn check_and_advance_pipeline(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        completed_stage: &str,
    ) -> OrchestrationResult<AdvanceOutcome> {
        let Some(project) = self.projects.get_project(project_id).await? else {
            warn!(project_id = %project_id, "Completion reported for unknown project");
            return Ok(AdvanceOutcome::ProjectMissing);
        };

        let template_id = project.template_id.as_deref();
        let orchestrator = self.orchestrator_for(template_id);
        let stage = if self.should_use_generic_orchestrator(template_id) {
            legacy_to_stage_id(completed_stage).unwrap_or(completed_stage)
        } else {
            completed_stage
        };

        debug!(
            project_id = %project_id,
            orchestrator = orchestrator.name(),
            stage = %stage,
            "Routing stage completion"
        );
        orchestrator.advance(project_id, user_id, stage).await
    }

    pub async fn fail_pipeline(&self, project_id: Uuid, reason: &str) -> OrchestrationResult<bool> {
        self.generic.fail_pipeline(project_id, reason).await
    }

    pub async fn run_summary(&self, project_id: Uuid) -> OrchestrationResult<Option<RunSummary>> {
        self.generic.run_summary(project_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_and_missing_template_use_legacy_chain() {
        assert!(!should_use_generic_orchestrator(None, "default"));
        assert!(!should_use_generic_orchestrator(Some("default"), "default"));
        assert!(should_use_generic_orchestrator(Some("short-form"), "default"));
        assert!(should_use_generic_orchestrator(Some("default"), "classic"));
    }
}
