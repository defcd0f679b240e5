//! # Pipeline Run
//!
//! One execution of a template for one project. Created once by
//! `start_pipeline`, mutated only by the orchestrator that owns it and never
//! deleted by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::frozen_config::FrozenConfig;
use crate::models::pipeline_run_stage::PipelineRunStage;
use crate::state_machine::RunStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub project_id: Uuid,
    pub template_slug: String,
    pub status: RunStatus,
    pub frozen_config: FrozenConfig,
    /// Last stage the engine began executing, informational only
    pub current_stage_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// New run for creation
#[derive(Debug, Clone)]
pub struct NewPipelineRun {
    pub project_id: Uuid,
    pub template_slug: String,
    pub frozen_config: FrozenConfig,
}

impl NewPipelineRun {
    pub fn into_run(self, id: Uuid, started_at: DateTime<Utc>) -> PipelineRun {
        PipelineRun {
            id,
            project_id: self.project_id,
            template_slug: self.template_slug,
            status: RunStatus::Running,
            frozen_config: self.frozen_config,
            current_stage_id: None,
            started_at,
            completed_at: None,
        }
    }
}

/// A run with its stage rows, for diagnostics and UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run: PipelineRun,
    pub stages: Vec<PipelineRunStage>,
}

impl RunSummary {
    pub fn stage(&self, stage_id: &str) -> Option<&PipelineRunStage> {
        self.stages.iter().find(|s| s.stage_id == stage_id)
    }
}
