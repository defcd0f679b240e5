//! Shared harness for orchestration integration tests: in-memory stores, a
//! recording queue and the default handler registry.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use reel_pipeline::config::{OrchestrationConfig, QueueConfig, QueueRoute};
use reel_pipeline::error::HandlerResult;
use reel_pipeline::handlers::{
    CompletionStatus, SingleJobHandler, StageHandler, StageHandlerContext,
};
use reel_pipeline::messaging::{JobSpec, RecordingJobQueue};
use reel_pipeline::models::{PipelineRun, PipelineTemplate, Project, StageDefinition};
use reel_pipeline::orchestration::{
    DagOrchestrator, ExecutionMode, LegacyOrchestrator, OrchestratorDeps, OrchestratorDispatcher,
};
use reel_pipeline::registry::default_registry;
use reel_pipeline::state_machine::StageStatus;
use reel_pipeline::store::InMemoryStore;
use reel_pipeline::templates::TemplateCatalog;

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub queue: Arc<RecordingJobQueue>,
    pub deps: OrchestratorDeps,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_templates(Vec::new())
    }

    pub fn with_templates(templates: Vec<PipelineTemplate>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(RecordingJobQueue::new());

        let mut catalog = TemplateCatalog::new();
        for template in templates {
            catalog.register(template).expect("test template is valid");
        }

        let deps = OrchestratorDeps {
            pipelines: store.clone(),
            projects: store.clone(),
            queue: queue.clone(),
            registry: Arc::new(default_registry(&QueueConfig::default(), store.clone())),
            templates: Arc::new(catalog),
        };

        Self { store, queue, deps }
    }

    pub fn dag(&self) -> DagOrchestrator {
        DagOrchestrator::new(self.deps.clone(), ExecutionMode::Dispatch)
    }

    pub fn legacy(&self, single_flight: bool) -> LegacyOrchestrator {
        LegacyOrchestrator::new(self.deps.clone(), QueueConfig::default(), single_flight)
    }

    pub fn dispatcher(&self) -> OrchestratorDispatcher {
        OrchestratorDispatcher::from_deps(
            self.deps.clone(),
            &OrchestrationConfig::default(),
            &QueueConfig::default(),
        )
    }

    /// Insert a draft project, returning `(project_id, user_id)`
    pub fn project(&self, template_id: Option<&str>) -> (Uuid, Uuid) {
        let project = Project::new(Uuid::new_v4(), template_id.map(str::to_string));
        let ids = (project.id, project.user_id);
        self.store.insert_project(project);
        ids
    }

    /// Register a single-job handler whose queue and job are named after the stage
    pub fn register_single(&self, stage_id: &str) {
        self.deps.registry.register(
            stage_id,
            Arc::new(SingleJobHandler::new(QueueRoute::new(stage_id, stage_id, 5))),
        );
    }

    /// Most recently created run of the project
    pub fn latest_run(&self, project_id: Uuid) -> PipelineRun {
        self.store
            .runs_for(project_id)
            .pop()
            .expect("project has a run")
    }

    pub fn stage_status(&self, run_id: Uuid, stage_id: &str) -> StageStatus {
        self.store.stage(run_id, stage_id).expect("stage row exists").status
    }

    pub fn job_count(&self, job_name: &str) -> usize {
        self.queue.jobs_named(job_name).len()
    }
}

pub fn template(id: &str, stages: Vec<StageDefinition>) -> PipelineTemplate {
    PipelineTemplate {
        id: id.to_string(),
        slug: id.to_string(),
        name: id.to_string(),
        stages,
    }
}

/// `{A: []}, {B: [A]}, {C: [A]}, {D: [B, C]}`
pub fn diamond(id: &str) -> PipelineTemplate {
    template(
        id,
        vec![
            StageDefinition::new("A", &[]).optional("a"),
            StageDefinition::new("B", &["A"]).optional("b"),
            StageDefinition::new("C", &["A"]).optional("c"),
            StageDefinition::new("D", &["B", "C"]).optional("d"),
        ],
    )
}

/// Counts `prepare_jobs` calls; every stage it handles completes on first report
pub struct CountingHandler {
    prepared: AtomicUsize,
    route: QueueRoute,
}

impl CountingHandler {
    pub fn new(stage_id: &str) -> Self {
        Self {
            prepared: AtomicUsize::new(0),
            route: QueueRoute::new(stage_id, stage_id, 5),
        }
    }

    pub fn prepared(&self) -> usize {
        self.prepared.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageHandler for CountingHandler {
    async fn prepare_jobs(&self, ctx: &StageHandlerContext) -> HandlerResult<Vec<JobSpec>> {
        self.prepared.fetch_add(1, Ordering::SeqCst);
        Ok(vec![JobSpec::from_route(
            &self.route,
            serde_json::json!({ "projectId": ctx.project_id }),
        )])
    }

    async fn check_completion(&self, _ctx: &StageHandlerContext) -> HandlerResult<CompletionStatus> {
        Ok(CompletionStatus::from_counts(1, 0, 1))
    }
}
