//! # Pipeline Run Stage
//!
//! One row per template stage per run, created in bulk at run start and
//! mutated in place. Job counters are whatever the stage handler last
//! reported; they are re-derived from durable state on every completion call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::state_machine::StageStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRunStage {
    pub run_id: Uuid,
    pub stage_id: String,
    pub status: StageStatus,
    pub job_count: i32,
    pub completed_jobs: i32,
    pub failed_jobs: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineRunStage {
    pub fn new(run_id: Uuid, stage_id: impl Into<String>, status: StageStatus) -> Self {
        let completed_at = status.is_terminal().then(Utc::now);
        Self {
            run_id,
            stage_id: stage_id.into(),
            status,
            job_count: 0,
            completed_jobs: 0,
            failed_jobs: 0,
            started_at: None,
            completed_at,
        }
    }
}

/// Handler-reported job counters for a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StageProgress {
    pub completed_jobs: i32,
    pub failed_jobs: i32,
    pub total_jobs: i32,
}

/// Stage ids that satisfy downstream dependencies
pub fn done_set(stages: &[PipelineRunStage]) -> HashSet<String> {
    stages
        .iter()
        .filter(|s| s.status.satisfies_dependencies())
        .map(|s| s.stage_id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_done_set_includes_completed_and_skipped_only() {
        let run_id = Uuid::new_v4();
        let stages = vec![
            PipelineRunStage::new(run_id, "a", StageStatus::Completed),
            PipelineRunStage::new(run_id, "b", StageStatus::Skipped),
            PipelineRunStage::new(run_id, "c", StageStatus::Running),
            PipelineRunStage::new(run_id, "d", StageStatus::Failed),
            PipelineRunStage::new(run_id, "e", StageStatus::Pending),
        ];
        let done = done_set(&stages);
        assert_eq!(done.len(), 2);
        assert!(done.contains("a") && done.contains("b"));
    }

    #[test]
    fn test_new_skipped_stage_is_stamped_complete() {
        let stage = PipelineRunStage::new(Uuid::new_v4(), "captions", StageStatus::Skipped);
        assert!(stage.completed_at.is_some());
        assert!(stage.started_at.is_none());
    }
}
