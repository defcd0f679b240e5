//! One job per active scene; completion is a full rescan of the project's
//! scenes against the stage's target status. A stage with no active scene
//! fails, since nothing would ever report its completion.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{CompletionStatus, StageHandler, StageHandlerContext};
use crate::config::QueueRoute;
use crate::constants::failure_reasons;
use crate::error::{HandlerError, HandlerResult};
use crate::messaging::job_queue::{stage_job_payload, JobSpec};
use crate::models::{active_scenes, SceneStatus, SceneTally};
use crate::store::ProjectStore;

pub struct SceneFanoutHandler {
    route: QueueRoute,
    target: SceneStatus,
    projects: Arc<dyn ProjectStore>,
}

impl SceneFanoutHandler {
    pub fn new(route: QueueRoute, target: SceneStatus, projects: Arc<dyn ProjectStore>) -> Self {
        Self {
            route,
            target,
            projects,
        }
    }
}

#[async_trait]
impl StageHandler for SceneFanoutHandler {
    async fn prepare_jobs(&self, ctx: &StageHandlerContext) -> HandlerResult<Vec<JobSpec>> {
        let scenes = self.projects.list_scenes(ctx.project_id).await?;
        let active = active_scenes(&scenes);
        if active.is_empty() {
            // No scene job would ever report back
            let reason = if scenes.is_empty() {
                failure_reasons::NO_SCENES
            } else {
                failure_reasons::ALL_SCENES_FAILED
            };
            return Err(HandlerError::Failed {
                stage_id: ctx.stage.stage_id.clone(),
                reason: reason.to_string(),
            });
        }

        let jobs: Vec<JobSpec> = active
            .into_iter()
            .map(|scene| {
                let payload = stage_job_payload(
                    ctx.project_id,
                    ctx.user_id,
                    Some(ctx.pipeline_run_id),
                    &ctx.stage.stage_id,
                    Some(scene.id),
                );
                JobSpec::from_route(&self.route, payload)
            })
            .collect();

        debug!(
            project_id = %ctx.project_id,
            stage_id = %ctx.stage.stage_id,
            scenes = scenes.len(),
            jobs = jobs.len(),
            "Prepared scene jobs"
        );
        Ok(jobs)
    }

    async fn check_completion(&self, ctx: &StageHandlerContext) -> HandlerResult<CompletionStatus> {
        let scenes = self.projects.list_scenes(ctx.project_id).await?;
        let tally = SceneTally::of(&scenes, self.target);

        Ok(CompletionStatus {
            is_complete: tally.is_settled(),
            completed_jobs: tally.reached as i32,
            failed_jobs: tally.failed as i32,
            total_jobs: tally.total as i32,
        })
    }
}
