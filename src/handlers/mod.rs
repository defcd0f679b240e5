//! # Stage Handlers
//!
//! The capability interface every stage type implements, plus the built-in
//! handlers of the default pipeline.
//!
//! A handler is asked to `prepare_jobs` exactly once, when its stage becomes
//! eligible, and to `check_completion` every time one of its jobs reports
//! finishing. `check_completion` must derive its answer from durable state:
//! it is called concurrently and counters arrive in no particular order.

pub mod scene_fanout;
pub mod single_job;
pub mod visuals_approval;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HandlerResult;
use crate::messaging::JobSpec;
use crate::models::{FrozenConfig, StageDefinition, StageProgress};

pub use scene_fanout::SceneFanoutHandler;
pub use single_job::SingleJobHandler;
pub use visuals_approval::VisualsApprovalHandler;

/// Everything a handler may know about the stage it is acting for
#[derive(Debug, Clone)]
pub struct StageHandlerContext {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub pipeline_run_id: Uuid,
    pub template_id: String,
    pub stage: StageDefinition,
    pub frozen_config: FrozenConfig,
}

/// Handler-reported completion of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionStatus {
    pub is_complete: bool,
    pub completed_jobs: i32,
    pub failed_jobs: i32,
    pub total_jobs: i32,
}

impl CompletionStatus {
    /// Complete once every job either completed or failed
    pub fn from_counts(completed_jobs: i32, failed_jobs: i32, total_jobs: i32) -> Self {
        Self {
            is_complete: completed_jobs + failed_jobs >= total_jobs,
            completed_jobs,
            failed_jobs,
            total_jobs,
        }
    }

    pub fn waiting(total_jobs: i32) -> Self {
        Self {
            is_complete: false,
            completed_jobs: 0,
            failed_jobs: 0,
            total_jobs,
        }
    }

    /// Work existed and none of it succeeded
    pub fn all_failed(&self) -> bool {
        self.total_jobs > 0 && self.failed_jobs >= self.total_jobs
    }

    pub fn progress(&self) -> StageProgress {
        StageProgress {
            completed_jobs: self.completed_jobs,
            failed_jobs: self.failed_jobs,
            total_jobs: self.total_jobs,
        }
    }
}

#[async_trait]
pub trait StageHandler: Send + Sync {
    /// Jobs to enqueue when the stage starts. Zero jobs means the stage works
    /// inline and reports its own completion later.
    async fn prepare_jobs(&self, ctx: &StageHandlerContext) -> HandlerResult<Vec<JobSpec>>;

    async fn check_completion(&self, ctx: &StageHandlerContext) -> HandlerResult<CompletionStatus>;
}
