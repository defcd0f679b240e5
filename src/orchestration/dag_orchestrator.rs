//! # DAG Orchestrator
//!
//! Template-driven pipeline engine. A run is a snapshot of a template plus the
//! project's frozen stage configuration; each stage row moves through
//! `pending -> running -> completed | skipped | failed` via conditional
//! transitions, so concurrent completion reports for the same stage start its
//! dependents at most once.
//!
//! ## Completion
//!
//! Workers report after every job. The report is not trusted as a counter:
//! the stage handler rescans durable state and decides whether the stage is
//! done. Only the caller whose `running -> completed` transition succeeds
//! walks the DAG forward.
//!
//! ## Modes
//!
//! In [`ExecutionMode::Dispatch`] the engine owns the project: it writes the
//! project status label of each stage it starts and enqueues the stage's
//! jobs. In [`ExecutionMode::Mirror`] it records stage progress alongside the
//! legacy chain and touches neither the project nor the queue.

use async_trait::async_trait;
use futures::future::try_join_all;
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::types::{
    AdvanceOutcome, AdvanceReport, ExecutionMode, Orchestrator, OrchestratorDeps, StageLaunch,
};
use crate::constants::failure_reasons;
use crate::error::{HandlerError, OrchestrationResult};
use crate::handlers::StageHandlerContext;
use crate::logging::log_stage_transition;
use crate::models::{
    done_set, is_stage_disabled, NewPipelineRun, PipelineRun, PipelineTemplate, ProjectStatus,
    RunSummary, StageDefinition,
};
use crate::state_machine::{RunStatus, StageStatus};

pub struct DagOrchestrator {
    deps: OrchestratorDeps,
    mode: ExecutionMode,
}

impl std::fmt::Debug for DagOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DagOrchestrator")
            .field("mode", &self.mode)
            .finish()
    }
}

impl DagOrchestrator {
    pub fn new(deps: OrchestratorDeps, mode: ExecutionMode) -> Self {
        Self { deps, mode }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn deps(&self) -> &OrchestratorDeps {
        &self.deps
    }

    fn context(
        &self,
        run: &PipelineRun,
        template: &PipelineTemplate,
        stage: &StageDefinition,
        user_id: Uuid,
    ) -> StageHandlerContext {
        StageHandlerContext {
            project_id: run.project_id,
            user_id,
            pipeline_run_id: run.id,
            template_id: template.id.clone(),
            stage: stage.clone(),
            frozen_config: run.frozen_config.clone(),
        }
    }

    /// Create a run for the project and start its root stages.
    ///
    /// Any run still `running` for the project is failed as superseded first.
    /// Stages disabled by the frozen configuration are created `skipped`.
    /// Returns `None` when the project does not exist.
    #[instrument(skip(self))]
    pub async fn start_pipeline(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> OrchestrationResult<Option<Uuid>> {
        let Some(project) = self.deps.projects.get_project(project_id).await? else {
            warn!(project_id = %project_id, "Project not found, pipeline not started");
            return Ok(None);
        };

        let template = self
            .deps
            .templates
            .resolve_template(project.template_id.as_deref());

        if let Some(previous) = self.deps.pipelines.find_running_run(project_id).await? {
            if self.fail_run(&previous, failure_reasons::SUPERSEDED).await? {
                warn!(
                    project_id = %project_id,
                    previous_run_id = %previous.id,
                    "Superseded running pipeline run"
                );
            }
        }

        let frozen_config = self.deps.projects.freeze_stage_config(project_id).await?;
        let stages = template
            .stages
            .iter()
            .map(|stage| {
                let status = if is_stage_disabled(stage, &frozen_config) {
                    StageStatus::Skipped
                } else {
                    StageStatus::Pending
                };
                (stage.stage_id.clone(), status)
            })
            .collect();

        let run = self
            .deps
            .pipelines
            .create_run(
                NewPipelineRun {
                    project_id,
                    template_slug: template.slug.clone(),
                    frozen_config,
                },
                stages,
            )
            .await?;

        info!(
            project_id = %project_id,
            run_id = %run.id,
            template = %template.slug,
            mode = ?self.mode,
            "Pipeline run created"
        );

        for root in template.find_root_stages() {
            if is_stage_disabled(root, &run.frozen_config) {
                continue;
            }
            if let StageLaunch::Failed { .. } =
                self.execute_stage(&run, &template, root, user_id).await?
            {
                return Ok(Some(run.id));
            }
        }

        // Disabled roots were created skipped; their dependents may be ready
        self.advance_after_completion(&run, &template, user_id)
            .await?;

        Ok(Some(run.id))
    }

    /// Handle a worker's report that a job of `completed_stage_id` finished.
    ///
    /// Safe to call any number of times per job: a stage that is no longer
    /// `running` is reported as already settled.
    #[instrument(skip(self))]
    pub async fn check_and_advance_pipeline(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        completed_stage_id: &str,
    ) -> OrchestrationResult<AdvanceOutcome> {
        let Some(run) = self.deps.pipelines.find_running_run(project_id).await? else {
            debug!(project_id = %project_id, "No running pipeline run");
            return Ok(AdvanceOutcome::NoActiveRun);
        };

        let Some(template) = self.deps.templates.get(&run.template_slug) else {
            warn!(
                run_id = %run.id,
                template = %run.template_slug,
                "Run references a template that is not in the catalog"
            );
            return Ok(AdvanceOutcome::TemplateMissing {
                template_slug: run.template_slug.clone(),
            });
        };

        let stage_row = self
            .deps
            .pipelines
            .get_stage(run.id, completed_stage_id)
            .await?;
        let (Some(stage), Some(stage_row)) = (template.stage(completed_stage_id), stage_row) else {
            warn!(
                run_id = %run.id,
                stage_id = %completed_stage_id,
                "Completion reported for a stage the run does not have"
            );
            return Ok(AdvanceOutcome::UnknownStage {
                stage_id: completed_stage_id.to_string(),
            });
        };

        if stage_row.status != StageStatus::Running {
            debug!(
                run_id = %run.id,
                stage_id = %completed_stage_id,
                status = %stage_row.status,
                "Stage already settled"
            );
            return Ok(AdvanceOutcome::AlreadySettled {
                stage_id: completed_stage_id.to_string(),
            });
        }

        let handler = self.deps.registry.get_required(&stage.stage_id)?;
        let completion = handler
            .check_completion(&self.context(&run, &template, stage, user_id))
            .await?;
        self.deps
            .pipelines
            .record_progress(run.id, &stage.stage_id, completion.progress())
            .await?;

        if !completion.is_complete {
            return Ok(AdvanceOutcome::Waiting(completion.progress()));
        }

        if completion.all_failed() {
            let reason = failure_reasons::all_jobs_failed(&stage.stage_id);
            self.fail_run(&run, &reason).await?;
            if self.mode == ExecutionMode::Dispatch {
                self.deps
                    .projects
                    .mark_project_failed(project_id, &reason)
                    .await?;
            }
            warn!(run_id = %run.id, stage_id = %stage.stage_id, reason = %reason, "Pipeline run failed");
            return Ok(AdvanceOutcome::RunFailed { reason });
        }

        let claimed = self
            .deps
            .pipelines
            .transition_stage(
                run.id,
                &stage.stage_id,
                &[StageStatus::Running],
                StageStatus::Completed,
            )
            .await?;
        if !claimed {
            debug!(run_id = %run.id, stage_id = %stage.stage_id, "Lost completion race");
            return Ok(AdvanceOutcome::AlreadySettled {
                stage_id: stage.stage_id.clone(),
            });
        }

        log_stage_transition(
            run.id,
            &stage.stage_id,
            StageStatus::Running,
            StageStatus::Completed,
            None,
        );

        let mut report = self
            .advance_after_completion(&run, &template, user_id)
            .await?;
        if let Some(reason) = report.run_failed.take() {
            return Ok(AdvanceOutcome::RunFailed { reason });
        }
        Ok(AdvanceOutcome::Advanced(report))
    }

    /// Start every pending stage whose dependencies are all done, skipping
    /// disabled ones, until the DAG stops moving. Completes the run once every
    /// stage is done.
    pub async fn advance_after_completion(
        &self,
        run: &PipelineRun,
        template: &PipelineTemplate,
        user_id: Uuid,
    ) -> OrchestrationResult<AdvanceReport> {
        let mut report = AdvanceReport::default();

        // A skip can make more stages eligible, so each one restarts the walk
        'walk: loop {
            let stages = self.deps.pipelines.list_stages(run.id).await?;
            let done = done_set(&stages);
            let pending: HashSet<&str> = stages
                .iter()
                .filter(|s| s.status == StageStatus::Pending)
                .map(|s| s.stage_id.as_str())
                .collect();

            let mut started_any = false;
            for stage in template.find_next_stages(&done) {
                if !pending.contains(stage.stage_id.as_str()) {
                    continue;
                }

                if is_stage_disabled(stage, &run.frozen_config) {
                    if self
                        .deps
                        .pipelines
                        .transition_stage(
                            run.id,
                            &stage.stage_id,
                            &[StageStatus::Pending],
                            StageStatus::Skipped,
                        )
                        .await?
                    {
                        log_stage_transition(
                            run.id,
                            &stage.stage_id,
                            StageStatus::Pending,
                            StageStatus::Skipped,
                            Some("disabled by frozen config"),
                        );
                        report.skipped.push(stage.stage_id.clone());
                    }
                    continue 'walk;
                }

                match self.execute_stage(run, template, stage, user_id).await? {
                    StageLaunch::Started { .. } => {
                        started_any = true;
                        report.started.push(stage.stage_id.clone());
                    }
                    StageLaunch::Skipped => {
                        report.skipped.push(stage.stage_id.clone());
                        continue 'walk;
                    }
                    StageLaunch::AlreadyClaimed => {}
                    StageLaunch::Failed { reason } => {
                        report.run_failed = Some(reason);
                        return Ok(report);
                    }
                }
            }

            if !started_any && template.is_exhausted(&done) {
                report.run_completed = self.complete_run(run).await?;
            }
            return Ok(report);
        }
    }

    async fn complete_run(&self, run: &PipelineRun) -> OrchestrationResult<bool> {
        if !self
            .deps
            .pipelines
            .finish_run(run.id, RunStatus::Completed)
            .await?
        {
            return Ok(false);
        }

        info!(run_id = %run.id, project_id = %run.project_id, "Pipeline run completed");
        if self.mode == ExecutionMode::Dispatch {
            self.deps
                .projects
                .update_project_progress(run.project_id, ProjectStatus::Completed, 100)
                .await?;
        }
        Ok(true)
    }

    /// Claim a pending stage and, in dispatch mode, enqueue its jobs.
    ///
    /// A stage without a registered handler is skipped with a warning rather
    /// than stalling the run. A handler that reports [`HandlerError::Failed`]
    /// while preparing jobs fails the run and the project.
    #[instrument(skip(self, run, template, stage), fields(run_id = %run.id, stage_id = %stage.stage_id))]
    pub async fn execute_stage(
        &self,
        run: &PipelineRun,
        template: &PipelineTemplate,
        stage: &StageDefinition,
        user_id: Uuid,
    ) -> OrchestrationResult<StageLaunch> {
        let Some(handler) = self.deps.registry.get(&stage.stage_id) else {
            warn!(
                stage_id = %stage.stage_id,
                known = ?self.deps.registry.stage_ids(),
                "No handler registered for stage, skipping"
            );
            let skipped = self
                .deps
                .pipelines
                .transition_stage(
                    run.id,
                    &stage.stage_id,
                    &[StageStatus::Pending],
                    StageStatus::Skipped,
                )
                .await?;
            if !skipped {
                return Ok(StageLaunch::AlreadyClaimed);
            }
            log_stage_transition(
                run.id,
                &stage.stage_id,
                StageStatus::Pending,
                StageStatus::Skipped,
                Some("no handler registered"),
            );
            return Ok(StageLaunch::Skipped);
        };

        let claimed = self
            .deps
            .pipelines
            .transition_stage(
                run.id,
                &stage.stage_id,
                &[StageStatus::Pending],
                StageStatus::Running,
            )
            .await?;
        if !claimed {
            return Ok(StageLaunch::AlreadyClaimed);
        }

        log_stage_transition(
            run.id,
            &stage.stage_id,
            StageStatus::Pending,
            StageStatus::Running,
            None,
        );
        self.deps
            .pipelines
            .set_current_stage(run.id, &stage.stage_id)
            .await?;

        if self.mode == ExecutionMode::Mirror {
            return Ok(StageLaunch::Started { job_count: 0 });
        }

        self.deps
            .projects
            .update_project_progress(
                run.project_id,
                stage.project_status_label,
                stage.progress_percent,
            )
            .await?;

        let jobs = match handler
            .prepare_jobs(&self.context(run, template, stage, user_id))
            .await
        {
            Ok(jobs) => jobs,
            Err(HandlerError::Failed { reason, .. }) => {
                self.fail_run(run, &reason).await?;
                self.deps
                    .projects
                    .mark_project_failed(run.project_id, &reason)
                    .await?;
                warn!(stage_id = %stage.stage_id, reason = %reason, "Stage cannot start, pipeline run failed");
                return Ok(StageLaunch::Failed { reason });
            }
            Err(e) => return Err(e.into()),
        };
        self.deps
            .pipelines
            .record_job_count(run.id, &stage.stage_id, jobs.len() as i32)
            .await?;

        let handles = try_join_all(jobs.iter().map(|job| self.deps.queue.enqueue(job))).await?;
        if handles.is_empty() {
            debug!(stage_id = %stage.stage_id, "Stage has no jobs, waiting for inline completion");
        } else {
            info!(stage_id = %stage.stage_id, jobs = handles.len(), "Stage jobs enqueued");
        }

        Ok(StageLaunch::Started {
            job_count: handles.len(),
        })
    }

    /// Fail the run and every stage still in flight. Returns false if the run
    /// was no longer running.
    async fn fail_run(&self, run: &PipelineRun, reason: &str) -> OrchestrationResult<bool> {
        if !self
            .deps
            .pipelines
            .finish_run(run.id, RunStatus::Failed)
            .await?
        {
            return Ok(false);
        }

        for stage in self.deps.pipelines.list_stages(run.id).await? {
            if stage.status == StageStatus::Running
                && self
                    .deps
                    .pipelines
                    .transition_stage(
                        run.id,
                        &stage.stage_id,
                        &[StageStatus::Running],
                        StageStatus::Failed,
                    )
                    .await?
            {
                log_stage_transition(
                    run.id,
                    &stage.stage_id,
                    StageStatus::Running,
                    StageStatus::Failed,
                    Some(reason),
                );
            }
        }
        Ok(true)
    }

    /// Fail the project's running run, if any, without touching the project
    pub async fn fail_active_run(&self, project_id: Uuid, reason: &str) -> OrchestrationResult<bool> {
        match self.deps.pipelines.find_running_run(project_id).await? {
            Some(run) => self.fail_run(&run, reason).await,
            None => Ok(false),
        }
    }

    /// Fail the project and its running run, e.g. on cancellation or a fatal
    /// worker error. Returns whether a running run was failed.
    #[instrument(skip(self))]
    pub async fn fail_pipeline(&self, project_id: Uuid, reason: &str) -> OrchestrationResult<bool> {
        let failed_run = self.fail_active_run(project_id, reason).await?;
        self.deps
            .projects
            .mark_project_failed(project_id, reason)
            .await?;
        warn!(project_id = %project_id, reason = %reason, failed_run, "Pipeline failed");
        Ok(failed_run)
    }

    /// The project's latest run with its stages in template order
    pub async fn run_summary(&self, project_id: Uuid) -> OrchestrationResult<Option<RunSummary>> {
        let Some(run) = self.deps.pipelines.find_latest_run(project_id).await? else {
            return Ok(None);
        };

        let mut stages = self.deps.pipelines.list_stages(run.id).await?;
        match self.deps.templates.get(&run.template_slug) {
            Some(template) => {
                let order: Vec<&str> = template.stage_ids().collect();
                stages.sort_by_key(|s| {
                    order
                        .iter()
                        .position(|id| *id == s.stage_id)
                        .unwrap_or(usize::MAX)
                });
            }
            None => stages.sort_by(|a, b| a.stage_id.cmp(&b.stage_id)),
        }

        Ok(Some(RunSummary { run, stages }))
    }
}

#[async_trait]
impl Orchestrator for DagOrchestrator {
    fn name(&self) -> &'static str {
        "dag"
    }

    async fn start(&self, project_id: Uuid, user_id: Uuid) -> OrchestrationResult<Option<Uuid>> {
        self.start_pipeline(project_id, user_id).await
    }

    async fn advance(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        completed_stage: &str,
    ) -> OrchestrationResult<AdvanceOutcome> {
        self.check_and_advance_pipeline(project_id, user_id, completed_stage)
            .await
    }
}
