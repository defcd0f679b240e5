use async_trait::async_trait;

use super::{CompletionStatus, StageHandler, StageHandlerContext};
use crate::config::QueueRoute;
use crate::error::HandlerResult;
use crate::messaging::job_queue::{stage_job_payload, JobSpec};

/// Stage backed by exactly one job. The job's own completion call is the
/// completion signal, so every check reports 1 of 1.
#[derive(Debug, Clone)]
pub struct SingleJobHandler {
    route: QueueRoute,
}

impl SingleJobHandler {
    pub fn new(route: QueueRoute) -> Self {
        Self { route }
    }
}

#[async_trait]
impl StageHandler for SingleJobHandler {
    async fn prepare_jobs(&self, ctx: &StageHandlerContext) -> HandlerResult<Vec<JobSpec>> {
        let payload = stage_job_payload(
            ctx.project_id,
            ctx.user_id,
            Some(ctx.pipeline_run_id),
            &ctx.stage.stage_id,
            None,
        );
        Ok(vec![JobSpec::from_route(&self.route, payload)])
    }

    async fn check_completion(&self, _ctx: &StageHandlerContext) -> HandlerResult<CompletionStatus> {
        Ok(CompletionStatus::from_counts(1, 0, 1))
    }
}
