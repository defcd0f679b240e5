//! # Legacy Orchestrator
//!
//! Hand-written advancement chain for projects on the built-in default
//! template. Each `advance_after_*` step re-reads the project's scenes instead
//! of counting job reports, enqueues the next stage's jobs and moves the
//! project status forward.
//!
//! Every step also mirrors its progress into a [`DagOrchestrator`] running in
//! [`ExecutionMode::Mirror`], so default-template projects get the same
//! per-stage run records as template-driven ones. Mirror failures are logged
//! and never fail the chain.
//!
//! With `single_flight` enabled, a step only enqueues downstream work after
//! winning a conditional project status transition out of its own stage's
//! label, so concurrent reports of the last scene advance the chain once.

use async_trait::async_trait;
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::dag_orchestrator::DagOrchestrator;
use super::stage_names::LegacyStage;
use super::types::{AdvanceOutcome, AdvanceReport, ExecutionMode, Orchestrator, OrchestratorDeps};
use crate::config::QueueConfig;
use crate::constants::{failure_reasons, stage_ids};
use crate::error::OrchestrationResult;
use crate::messaging::job_queue::{stage_job_payload, JobQueue, JobSpec};
use crate::models::{
    active_scenes, is_stage_disabled, FrozenConfig, PipelineTemplate, ProjectStatus, Scene,
    SceneStatus, SceneTally, StageProgress,
};
use crate::store::{PipelineStore, ProjectStore};
use crate::templates::default_template;

/// Result of re-scanning the scenes behind a per-scene stage
enum SceneGate {
    Ready(Vec<Scene>),
    Halt(AdvanceOutcome),
}

pub struct LegacyOrchestrator {
    projects: Arc<dyn ProjectStore>,
    pipelines: Arc<dyn PipelineStore>,
    queue: Arc<dyn JobQueue>,
    queues: QueueConfig,
    template: PipelineTemplate,
    mirror: DagOrchestrator,
    single_flight: bool,
}

impl std::fmt::Debug for LegacyOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LegacyOrchestrator")
            .field("single_flight", &self.single_flight)
            .finish()
    }
}

fn advanced(started: &[&str]) -> AdvanceOutcome {
    AdvanceOutcome::Advanced(AdvanceReport {
        started: started.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    })
}

fn settled(stage_id: &str) -> AdvanceOutcome {
    AdvanceOutcome::AlreadySettled {
        stage_id: stage_id.to_string(),
    }
}

fn with_skipped(mut outcome: AdvanceOutcome, stage_id: &str) -> AdvanceOutcome {
    if let AdvanceOutcome::Advanced(report) = &mut outcome {
        report.skipped.insert(0, stage_id.to_string());
    }
    outcome
}

impl LegacyOrchestrator {
    pub fn new(deps: OrchestratorDeps, queues: QueueConfig, single_flight: bool) -> Self {
        Self {
            projects: deps.projects.clone(),
            pipelines: deps.pipelines.clone(),
            queue: deps.queue.clone(),
            queues,
            template: default_template(),
            mirror: DagOrchestrator::new(deps, ExecutionMode::Mirror),
            single_flight,
        }
    }

    /// The mirror engine, for run inspection
    pub fn mirror(&self) -> &DagOrchestrator {
        &self.mirror
    }

    fn label(&self, stage_id: &str) -> (ProjectStatus, i32) {
        self.template
            .stage(stage_id)
            .map(|s| (s.project_status_label, s.progress_percent))
            .unwrap_or((ProjectStatus::Draft, 0))
    }

    fn stage_disabled(&self, stage_id: &str, frozen_config: &FrozenConfig) -> bool {
        self.template
            .stage(stage_id)
            .is_some_and(|stage| is_stage_disabled(stage, frozen_config))
    }

    /// The mirror run's id and frozen config, or the live snapshot when no
    /// mirror run exists
    async fn run_context(&self, project_id: Uuid) -> OrchestrationResult<(Option<Uuid>, FrozenConfig)> {
        match self.pipelines.find_running_run(project_id).await? {
            Some(run) => Ok((Some(run.id), run.frozen_config)),
            None => Ok((None, self.projects.freeze_stage_config(project_id).await?)),
        }
    }

    async fn claim(
        &self,
        project_id: Uuid,
        from: ProjectStatus,
        next_stage_id: &str,
    ) -> OrchestrationResult<bool> {
        let (to, progress) = self.label(next_stage_id);
        self.claim_status(project_id, from, to, progress).await
    }

    async fn claim_status(
        &self,
        project_id: Uuid,
        from: ProjectStatus,
        to: ProjectStatus,
        progress: i32,
    ) -> OrchestrationResult<bool> {
        if !self.single_flight {
            self.projects
                .update_project_progress(project_id, to, progress)
                .await?;
            return Ok(true);
        }

        let won = self
            .projects
            .transition_project_status(project_id, &[from], to, progress)
            .await?;
        if !won {
            debug!(
                project_id = %project_id,
                from = from.as_str(),
                to = to.as_str(),
                "Project already advanced by another caller"
            );
        }
        Ok(won)
    }

    async fn enqueue(&self, jobs: Vec<JobSpec>) -> OrchestrationResult<usize> {
        let handles = try_join_all(jobs.iter().map(|job| self.queue.enqueue(job))).await?;
        Ok(handles.len())
    }

    async fn enqueue_single(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        run_id: Option<Uuid>,
        stage_id: &str,
    ) -> OrchestrationResult<usize> {
        let payload = stage_job_payload(project_id, user_id, run_id, stage_id, None);
        self.enqueue(vec![JobSpec::from_route(&self.queues.route(stage_id), payload)])
            .await
    }

    async fn enqueue_per_scene(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        run_id: Option<Uuid>,
        stage_id: &str,
        scenes: &[Scene],
    ) -> OrchestrationResult<usize> {
        let route = self.queues.route(stage_id);
        let jobs = active_scenes(scenes)
            .into_iter()
            .map(|scene| {
                let payload =
                    stage_job_payload(project_id, user_id, run_id, stage_id, Some(scene.id));
                JobSpec::from_route(&route, payload)
            })
            .collect::<Vec<_>>();
        if jobs.is_empty() {
            warn!(project_id = %project_id, stage_id = %stage_id, "No active scenes to enqueue");
        }
        let count = self.enqueue(jobs).await?;
        info!(project_id = %project_id, stage_id = %stage_id, jobs = count, "Scene jobs enqueued");
        Ok(count)
    }

    /// Record legacy progress in the mirror run. Never fails the caller.
    async fn mirror_progress(&self, project_id: Uuid, user_id: Uuid, stage_id: &str) {
        match self
            .mirror
            .check_and_advance_pipeline(project_id, user_id, stage_id)
            .await
        {
            Ok(outcome) => debug!(project_id = %project_id, stage_id, ?outcome, "Mirrored stage progress"),
            Err(e) => warn!(
                project_id = %project_id,
                stage_id,
                error = %e,
                "Failed to mirror stage progress"
            ),
        }
    }

    async fn fail_project(&self, project_id: Uuid, reason: &str) -> OrchestrationResult<AdvanceOutcome> {
        self.projects.mark_project_failed(project_id, reason).await?;
        if let Err(e) = self.mirror.fail_active_run(project_id, reason).await {
            warn!(project_id = %project_id, error = %e, "Failed to fail mirror run");
        }
        warn!(project_id = %project_id, reason, "Project failed");
        Ok(AdvanceOutcome::RunFailed {
            reason: reason.to_string(),
        })
    }

    /// Proceed only once no scene is still short of `target`
    async fn scene_gate(&self, project_id: Uuid, target: SceneStatus) -> OrchestrationResult<SceneGate> {
        let scenes = self.projects.list_scenes(project_id).await?;
        let tally = SceneTally::of(&scenes, target);

        if !tally.is_settled() {
            return Ok(SceneGate::Halt(AdvanceOutcome::Waiting(StageProgress {
                completed_jobs: tally.reached as i32,
                failed_jobs: tally.failed as i32,
                total_jobs: tally.total as i32,
            })));
        }
        if tally.all_failed() {
            let outcome = self
                .fail_project(project_id, failure_reasons::ALL_SCENES_FAILED)
                .await?;
            return Ok(SceneGate::Halt(outcome));
        }
        Ok(SceneGate::Ready(scenes))
    }

    /// Put the project into ingestion, start the mirror run and enqueue the
    /// ingestion job. Returns the mirror run id when one was created.
    #[instrument(skip(self))]
    pub async fn start_pipeline(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> OrchestrationResult<Option<Uuid>> {
        if self.projects.get_project(project_id).await?.is_none() {
            warn!(project_id = %project_id, "Project not found, pipeline not started");
            return Ok(None);
        }

        let run_id = match self.mirror.start_pipeline(project_id, user_id).await {
            Ok(run_id) => run_id,
            Err(e) => {
                warn!(project_id = %project_id, error = %e, "Failed to start mirror run");
                None
            }
        };

        let (status, progress) = self.label(stage_ids::INGESTION);
        self.projects
            .update_project_progress(project_id, status, progress)
            .await?;
        self.enqueue_single(project_id, user_id, run_id, stage_ids::INGESTION)
            .await?;

        info!(project_id = %project_id, run_id = ?run_id, "Legacy pipeline started");
        Ok(run_id)
    }

    #[instrument(skip(self))]
    pub async fn advance_after_ingestion(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> OrchestrationResult<AdvanceOutcome> {
        let (run_id, _) = self.run_context(project_id).await?;
        if !self
            .claim(project_id, ProjectStatus::Ingesting, stage_ids::STORY_WRITING)
            .await?
        {
            return Ok(settled(stage_ids::INGESTION));
        }

        self.enqueue_single(project_id, user_id, run_id, stage_ids::STORY_WRITING)
            .await?;
        self.mirror_progress(project_id, user_id, stage_ids::INGESTION)
            .await;
        Ok(advanced(&[stage_ids::STORY_WRITING]))
    }

    #[instrument(skip(self))]
    pub async fn advance_after_story_writing(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> OrchestrationResult<AdvanceOutcome> {
        let (run_id, _) = self.run_context(project_id).await?;
        let scenes = self.projects.list_scenes(project_id).await?;
        if active_scenes(&scenes).is_empty() {
            // No scene job would ever report back
            return self.fail_project(project_id, failure_reasons::NO_SCENES).await;
        }

        if !self
            .claim(project_id, ProjectStatus::WritingStory, stage_ids::SCENE_GENERATION)
            .await?
        {
            return Ok(settled(stage_ids::STORY_WRITING));
        }

        self.enqueue_per_scene(project_id, user_id, run_id, stage_ids::SCENE_GENERATION, &scenes)
            .await?;
        self.mirror_progress(project_id, user_id, stage_ids::STORY_WRITING)
            .await;
        Ok(advanced(&[stage_ids::SCENE_GENERATION]))
    }

    #[instrument(skip(self))]
    pub async fn advance_after_scene_generation(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> OrchestrationResult<AdvanceOutcome> {
        if let SceneGate::Halt(outcome) = self.scene_gate(project_id, SceneStatus::ImageReady).await? {
            return Ok(outcome);
        }

        let (_, frozen_config) = self.run_context(project_id).await?;
        if !self
            .claim(project_id, ProjectStatus::GeneratingScenes, stage_ids::VISUALS_APPROVAL)
            .await?
        {
            return Ok(settled(stage_ids::SCENE_GENERATION));
        }
        self.mirror_progress(project_id, user_id, stage_ids::SCENE_GENERATION)
            .await;

        if self.stage_disabled(stage_ids::VISUALS_APPROVAL, &frozen_config) {
            let outcome = self.advance_after_visuals_approved(project_id, user_id).await?;
            return Ok(with_skipped(outcome, stage_ids::VISUALS_APPROVAL));
        }

        info!(project_id = %project_id, "Scenes ready, awaiting visuals approval");
        Ok(advanced(&[stage_ids::VISUALS_APPROVAL]))
    }

    /// Called once the user approved the visuals, or directly when approval
    /// is disabled for the project
    #[instrument(skip(self))]
    pub async fn advance_after_visuals_approved(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> OrchestrationResult<AdvanceOutcome> {
        let Some(project) = self.projects.get_project(project_id).await? else {
            return Ok(AdvanceOutcome::ProjectMissing);
        };

        let (run_id, frozen_config) = self.run_context(project_id).await?;
        let approval_enabled = !self.stage_disabled(stage_ids::VISUALS_APPROVAL, &frozen_config);
        if approval_enabled && project.visuals_approved_at.is_none() {
            debug!(project_id = %project_id, "Visuals not approved yet");
            return Ok(AdvanceOutcome::Waiting(StageProgress {
                total_jobs: 1,
                ..Default::default()
            }));
        }

        let video_enabled = !self.stage_disabled(stage_ids::VIDEO_GENERATION, &frozen_config);
        let next = if video_enabled {
            stage_ids::VIDEO_GENERATION
        } else {
            stage_ids::TTS
        };

        if !self
            .claim(project_id, ProjectStatus::AwaitingApproval, next)
            .await?
        {
            return Ok(settled(stage_ids::VISUALS_APPROVAL));
        }

        let scenes = self.projects.list_scenes(project_id).await?;
        self.enqueue_per_scene(project_id, user_id, run_id, next, &scenes)
            .await?;
        if approval_enabled {
            self.mirror_progress(project_id, user_id, stage_ids::VISUALS_APPROVAL)
                .await;
        }

        let outcome = advanced(&[next]);
        Ok(if video_enabled {
            outcome
        } else {
            with_skipped(outcome, stage_ids::VIDEO_GENERATION)
        })
    }

    #[instrument(skip(self))]
    pub async fn advance_after_video_generation(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> OrchestrationResult<AdvanceOutcome> {
        let scenes = match self.scene_gate(project_id, SceneStatus::VideoReady).await? {
            SceneGate::Ready(scenes) => scenes,
            SceneGate::Halt(outcome) => return Ok(outcome),
        };

        let (run_id, _) = self.run_context(project_id).await?;
        if !self
            .claim(project_id, ProjectStatus::GeneratingVideo, stage_ids::TTS)
            .await?
        {
            return Ok(settled(stage_ids::VIDEO_GENERATION));
        }

        self.enqueue_per_scene(project_id, user_id, run_id, stage_ids::TTS, &scenes)
            .await?;
        self.mirror_progress(project_id, user_id, stage_ids::VIDEO_GENERATION)
            .await;
        Ok(advanced(&[stage_ids::TTS]))
    }

    #[instrument(skip(self))]
    pub async fn advance_after_tts(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> OrchestrationResult<AdvanceOutcome> {
        if let SceneGate::Halt(outcome) = self.scene_gate(project_id, SceneStatus::AudioReady).await? {
            return Ok(outcome);
        }

        let (run_id, _) = self.run_context(project_id).await?;
        if !self
            .claim(project_id, ProjectStatus::GeneratingAudio, stage_ids::AUDIO_MIXING)
            .await?
        {
            return Ok(settled(stage_ids::TTS));
        }

        self.enqueue_single(project_id, user_id, run_id, stage_ids::AUDIO_MIXING)
            .await?;
        self.mirror_progress(project_id, user_id, stage_ids::TTS).await;
        Ok(advanced(&[stage_ids::AUDIO_MIXING]))
    }

    #[instrument(skip(self))]
    pub async fn advance_after_audio_mixing(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> OrchestrationResult<AdvanceOutcome> {
        let (run_id, frozen_config) = self.run_context(project_id).await?;
        if self.stage_disabled(stage_ids::CAPTION_GENERATION, &frozen_config) {
            let outcome = self
                .advance_after_caption_or_assembly(
                    project_id,
                    user_id,
                    ProjectStatus::MixingAudio,
                    stage_ids::AUDIO_MIXING,
                )
                .await?;
            return Ok(with_skipped(outcome, stage_ids::CAPTION_GENERATION));
        }

        if !self
            .claim(project_id, ProjectStatus::MixingAudio, stage_ids::CAPTION_GENERATION)
            .await?
        {
            return Ok(settled(stage_ids::AUDIO_MIXING));
        }

        self.enqueue_single(project_id, user_id, run_id, stage_ids::CAPTION_GENERATION)
            .await?;
        self.mirror_progress(project_id, user_id, stage_ids::AUDIO_MIXING)
            .await;
        Ok(advanced(&[stage_ids::CAPTION_GENERATION]))
    }

    #[instrument(skip(self))]
    pub async fn advance_after_caption_generation(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> OrchestrationResult<AdvanceOutcome> {
        self.advance_after_caption_or_assembly(
            project_id,
            user_id,
            ProjectStatus::GeneratingCaptions,
            stage_ids::CAPTION_GENERATION,
        )
        .await
    }

    /// Enqueue assembly, after captions or straight after mixing when captions
    /// are disabled. `completed_stage_id` is the stage being left.
    pub async fn advance_after_caption_or_assembly(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        from: ProjectStatus,
        completed_stage_id: &str,
    ) -> OrchestrationResult<AdvanceOutcome> {
        let (run_id, _) = self.run_context(project_id).await?;
        if !self.claim(project_id, from, stage_ids::ASSEMBLY).await? {
            return Ok(settled(completed_stage_id));
        }

        self.enqueue_single(project_id, user_id, run_id, stage_ids::ASSEMBLY)
            .await?;
        self.mirror_progress(project_id, user_id, completed_stage_id)
            .await;
        Ok(advanced(&[stage_ids::ASSEMBLY]))
    }

    #[instrument(skip(self))]
    pub async fn advance_after_assembly(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> OrchestrationResult<AdvanceOutcome> {
        if !self
            .claim_status(project_id, ProjectStatus::Assembling, ProjectStatus::Completed, 100)
            .await?
        {
            return Ok(settled(stage_ids::ASSEMBLY));
        }

        self.mirror_progress(project_id, user_id, stage_ids::ASSEMBLY)
            .await;
        info!(project_id = %project_id, "Legacy pipeline completed");
        Ok(AdvanceOutcome::Advanced(AdvanceReport {
            run_completed: true,
            ..Default::default()
        }))
    }

    pub async fn advance_stage(
        &self,
        project_id: Uuid,
        user_id: Uuid,
        stage: LegacyStage,
    ) -> OrchestrationResult<AdvanceOutcome> {
        match stage {
            LegacyStage::Ingestion => self.advance_after_ingestion(project_id, user_id).await,
            LegacyStage::StoryWriting => self.advance_after_story_writing(project_id, user_id).await,
            LegacyStage::SceneGeneration => {
                self.advance_after_scene_generation(project_id, user_id).await
            }
            LegacyStage::VisualsApproval => {
                self.advance_after_visuals_approved(project_id, user_id).await
            }
            LegacyStage::VideoGeneration => {
                self.advance_after_video_generation(project_id, user_id).await
            }
            LegacyStage::Tts => self.advance_after_tts(project_id, user_id).await,
            LegacyStage::AudioMixing => self.advance_after_audio_mixing(project_id, user_id).await,
            LegacyStage::CaptionGeneration => {
                self.advance_after_caption_generation(project_id, user_id).await
            }
            LegacyStage::Assembly => self.advance_after_assembly(project_id, user_id).await,
        }
    }
}

#[async_trait]
impl Orchestrator for LegacyOrchestrator {
    fn name(&self) -> &'static str {
        "legacy"
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
        match completed_stage.parse::<LegacyStage>() {
            Ok(stage) => self.advance_stage(project_id, user_id, stage).await,
            Err(_) => {
                warn!(project_id = %project_id, stage = completed_stage, "Unknown legacy stage");
                Ok(AdvanceOutcome::UnknownStage {
                    stage_id: completed_stage.to_string(),
                })
            }
        }
    }
}
