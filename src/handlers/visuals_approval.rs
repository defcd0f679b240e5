use async_trait::async_trait;
use std::sync::Arc;

use super::{CompletionStatus, StageHandler, StageHandlerContext};
use crate::error::{HandlerError, HandlerResult};
use crate::messaging::JobSpec;
use crate::store::ProjectStore;

/// Inline stage: no jobs, done once the user has approved the generated
/// visuals. The approval endpoint reports completion for this stage.
pub struct VisualsApprovalHandler {
    projects: Arc<dyn ProjectStore>,
}

impl VisualsApprovalHandler {
    pub fn new(projects: Arc<dyn ProjectStore>) -> Self {
        Self { projects }
    }
}

#[async_trait]
impl StageHandler for VisualsApprovalHandler {
    async fn prepare_jobs(&self, _ctx: &StageHandlerContext) -> HandlerResult<Vec<JobSpec>> {
        Ok(Vec::new())
    }

    async fn check_completion(&self, ctx: &StageHandlerContext) -> HandlerResult<CompletionStatus> {
        let project = self
            .projects
            .get_project(ctx.project_id)
            .await?
            .ok_or(HandlerError::ProjectNotFound {
                project_id: ctx.project_id,
            })?;

        Ok(match project.visuals_approved_at {
            Some(_) => CompletionStatus::from_counts(1, 0, 1),
            None => CompletionStatus::waiting(1),
        })
    }
}
