//! # Stores
//!
//! Persistence seams for the orchestrator. Every mutation is a single-row
//! update scoped by the row's own identity; transitions are conditional on an
//! explicit set of source states and report whether this caller performed
//! them, which is what lets concurrent completions race safely.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::{
    FrozenConfig, NewPipelineRun, PipelineRun, PipelineRunStage, Project, ProjectStatus, Scene,
    StageProgress,
};
use crate::state_machine::{RunStatus, StageStatus};

pub use memory::InMemoryStore;
pub use postgres::{PgPipelineStore, PgProjectStore};

/// Durable `PipelineRun` / `PipelineRunStage` records
#[async_trait]
pub trait PipelineStore: Send + Sync {
    /// Insert the run and all of its stage rows
    async fn create_run(
        &self,
        new_run: NewPipelineRun,
        stages: Vec<(String, StageStatus)>,
    ) -> StoreResult<PipelineRun>;

    /// Most recent `running` run for the project
    async fn find_running_run(&self, project_id: Uuid) -> StoreResult<Option<PipelineRun>>;

    /// Most recent run for the project in any status
    async fn find_latest_run(&self, project_id: Uuid) -> StoreResult<Option<PipelineRun>>;

    async fn list_stages(&self, run_id: Uuid) -> StoreResult<Vec<PipelineRunStage>>;

    async fn get_stage(&self, run_id: Uuid, stage_id: &str)
        -> StoreResult<Option<PipelineRunStage>>;

    /// Move a stage to `to` if it is currently in one of `from`
    async fn transition_stage(
        &self,
        run_id: Uuid,
        stage_id: &str,
        from: &[StageStatus],
        to: StageStatus,
    ) -> StoreResult<bool>;

    async fn record_job_count(&self, run_id: Uuid, stage_id: &str, job_count: i32)
        -> StoreResult<()>;

    async fn record_progress(
        &self,
        run_id: Uuid,
        stage_id: &str,
        progress: StageProgress,
    ) -> StoreResult<()>;

    async fn set_current_stage(&self, run_id: Uuid, stage_id: &str) -> StoreResult<()>;

    /// Move a `running` run to a terminal status
    async fn finish_run(&self, run_id: Uuid, to: RunStatus) -> StoreResult<bool>;
}

/// Project-side rows owned outside the orchestrator
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn get_project(&self, project_id: Uuid) -> StoreResult<Option<Project>>;

    /// Unconditional coarse status/progress update
    async fn update_project_progress(
        &self,
        project_id: Uuid,
        status: ProjectStatus,
        progress: i32,
    ) -> StoreResult<()>;

    /// Conditional status update; true when this caller moved the project
    async fn transition_project_status(
        &self,
        project_id: Uuid,
        from: &[ProjectStatus],
        to: ProjectStatus,
        progress: i32,
    ) -> StoreResult<bool>;

    async fn mark_project_failed(&self, project_id: Uuid, reason: &str) -> StoreResult<()>;

    /// Every scene of the project, in script order
    async fn list_scenes(&self, project_id: Uuid) -> StoreResult<Vec<Scene>>;

    /// Snapshot of the project's current stage configuration
    async fn freeze_stage_config(&self, project_id: Uuid) -> StoreResult<FrozenConfig>;
}
