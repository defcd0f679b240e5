//! # In-Memory Store
//!
//! Single-process implementation of both store traits. Conditional transitions
//! take the lock once, so they behave like the targeted row updates of the
//! Postgres store under concurrent callers. Used by tests and local tooling.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use super::{PipelineStore, ProjectStore};
use crate::error::StoreResult;
use crate::models::{
    FrozenConfig, NewPipelineRun, PipelineRun, PipelineRunStage, Project, ProjectStatus, Scene,
    SceneStatus, StageProgress,
};
use crate::state_machine::{RunStatus, StageStatus};

#[derive(Debug, Default)]
struct State {
    runs: Vec<PipelineRun>,
    stages: Vec<PipelineRunStage>,
    projects: HashMap<Uuid, Project>,
    scenes: Vec<Scene>,
    stage_configs: HashMap<Uuid, Value>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_project(&self, project: Project) {
        self.state.lock().projects.insert(project.id, project);
    }

    /// Replace the live stage configuration the next run will freeze
    pub fn set_stage_config(&self, project_id: Uuid, config: Value) {
        self.state.lock().stage_configs.insert(project_id, config);
    }

    /// Add `count` scripted scenes and return their ids in order
    pub fn add_scenes(&self, project_id: Uuid, count: usize) -> Vec<Uuid> {
        let mut state = self.state.lock();
        let offset = state
            .scenes
            .iter()
            .filter(|s| s.project_id == project_id)
            .count();
        (0..count)
            .map(|i| {
                let scene = Scene {
                    id: Uuid::new_v4(),
                    project_id,
                    position: (offset + i) as i32,
                    status: SceneStatus::Scripted,
                };
                let id = scene.id;
                state.scenes.push(scene);
                id
            })
            .collect()
    }

    pub fn set_scene_status(&self, scene_id: Uuid, status: SceneStatus) {
        let mut state = self.state.lock();
        if let Some(scene) = state.scenes.iter_mut().find(|s| s.id == scene_id) {
            scene.status = status;
        }
    }

    /// Record the user's approval of the generated visuals
    pub fn approve_visuals(&self, project_id: Uuid) {
        if let Some(project) = self.state.lock().projects.get_mut(&project_id) {
            project.visuals_approved_at = Some(Utc::now());
        }
    }

    pub fn project(&self, project_id: Uuid) -> Option<Project> {
        self.state.lock().projects.get(&project_id).cloned()
    }

    pub fn runs_for(&self, project_id: Uuid) -> Vec<PipelineRun> {
        self.state
            .lock()
            .runs
            .iter()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect()
    }

    pub fn stage(&self, run_id: Uuid, stage_id: &str) -> Option<PipelineRunStage> {
        self.state
            .lock()
            .stages
            .iter()
            .find(|s| s.run_id == run_id && s.stage_id == stage_id)
            .cloned()
    }
}

#[async_trait]
impl PipelineStore for InMemoryStore {
    async fn create_run(
        &self,
        new_run: NewPipelineRun,
        stages: Vec<(String, StageStatus)>,
    ) -> StoreResult<PipelineRun> {
        let run = new_run.into_run(Uuid::new_v4(), Utc::now());
        let mut state = self.state.lock();
        state.stages.extend(
            stages
                .into_iter()
                .map(|(stage_id, status)| PipelineRunStage::new(run.id, stage_id, status)),
        );
        state.runs.push(run.clone());
        Ok(run)
    }

    async fn find_running_run(&self, project_id: Uuid) -> StoreResult<Option<PipelineRun>> {
        Ok(self
            .state
            .lock()
            .runs
            .iter()
            .rev()
            .find(|r| r.project_id == project_id && r.status == RunStatus::Running)
            .cloned())
    }

    async fn find_latest_run(&self, project_id: Uuid) -> StoreResult<Option<PipelineRun>> {
        Ok(self
            .state
            .lock()
            .runs
            .iter()
            .rev()
            .find(|r| r.project_id == project_id)
            .cloned())
    }

    async fn list_stages(&self, run_id: Uuid) -> StoreResult<Vec<PipelineRunStage>> {
        Ok(self
            .state
            .lock()
            .stages
            .iter()
            .filter(|s| s.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn get_stage(
        &self,
        run_id: Uuid,
        stage_id: &str,
    ) -> StoreResult<Option<PipelineRunStage>> {
        Ok(self.stage(run_id, stage_id))
    }

    async fn transition_stage(
        &self,
        run_id: Uuid,
        stage_id: &str,
        from: &[StageStatus],
        to: StageStatus,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock();
        let Some(stage) = state
            .stages
            .iter_mut()
            .find(|s| s.run_id == run_id && s.stage_id == stage_id && from.contains(&s.status))
        else {
            return Ok(false);
        };

        stage.status = to;
        if to == StageStatus::Running {
            stage.started_at = Some(Utc::now());
        }
        if to.is_terminal() {
            stage.completed_at = Some(Utc::now());
        }
        Ok(true)
    }

    async fn record_job_count(
        &self,
        run_id: Uuid,
        stage_id: &str,
        job_count: i32,
    ) -> StoreResult<()> {
        let mut state = self.state.lock();
        if let Some(stage) = state
            .stages
            .iter_mut()
            .find(|s| s.run_id == run_id && s.stage_id == stage_id)
        {
            stage.job_count = job_count;
        }
        Ok(())
    }

    async fn record_progress(
        &self,
        run_id: Uuid,
        stage_id: &str,
        progress: StageProgress,
    ) -> StoreResult<()> {
        let mut state = self.state.lock();
        if let Some(stage) = state
            .stages
            .iter_mut()
            .find(|s| s.run_id == run_id && s.stage_id == stage_id)
        {
            stage.completed_jobs = progress.completed_jobs;
            stage.failed_jobs = progress.failed_jobs;
            stage.job_count = progress.total_jobs;
        }
        Ok(())
    }

    async fn set_current_stage(&self, run_id: Uuid, stage_id: &str) -> StoreResult<()> {
        let mut state = self.state.lock();
        if let Some(run) = state.runs.iter_mut().find(|r| r.id == run_id) {
            run.current_stage_id = Some(stage_id.to_string());
        }
        Ok(())
    }

    async fn finish_run(&self, run_id: Uuid, to: RunStatus) -> StoreResult<bool> {
        let mut state = self.state.lock();
        let Some(run) = state
            .runs
            .iter_mut()
            .find(|r| r.id == run_id && r.status == RunStatus::Running)
        else {
            return Ok(false);
        };
        run.status = to;
        run.completed_at = Some(Utc::now());
        Ok(true)
    }
}

#[async_trait]
impl ProjectStore for InMemoryStore {
    async fn get_project(&self, project_id: Uuid) -> StoreResult<Option<Project>> {
        Ok(self.project(project_id))
    }

    async fn update_project_progress(
        &self,
        project_id: Uuid,
        status: ProjectStatus,
        progress: i32,
    ) -> StoreResult<()> {
        if let Some(project) = self.state.lock().projects.get_mut(&project_id) {
            project.status = status;
            project.progress = progress;
        }
        Ok(())
    }

    async fn transition_project_status(
        &self,
        project_id: Uuid,
        from: &[ProjectStatus],
        to: ProjectStatus,
        progress: i32,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock();
        match state.projects.get_mut(&project_id) {
            Some(project) if from.contains(&project.status) => {
                project.status = to;
                project.progress = progress;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_project_failed(&self, project_id: Uuid, reason: &str) -> StoreResult<()> {
        if let Some(project) = self.state.lock().projects.get_mut(&project_id) {
            project.status = ProjectStatus::Failed;
            project.failure_reason = Some(reason.to_string());
        }
        Ok(())
    }

    async fn list_scenes(&self, project_id: Uuid) -> StoreResult<Vec<Scene>> {
        let mut scenes: Vec<Scene> = self
            .state
            .lock()
            .scenes
            .iter()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect();
        scenes.sort_by_key(|s| s.position);
        Ok(scenes)
    }

    async fn freeze_stage_config(&self, project_id: Uuid) -> StoreResult<FrozenConfig> {
        Ok(self
            .state
            .lock()
            .stage_configs
            .get(&project_id)
            .cloned()
            .map(FrozenConfig::from_value)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stage_transition_is_conditional() {
        let store = InMemoryStore::new();
        let run = store
            .create_run(
                NewPipelineRun {
                    project_id: Uuid::new_v4(),
                    template_slug: "default".to_string(),
                    frozen_config: FrozenConfig::default(),
                },
                vec![("a".to_string(), StageStatus::Pending)],
            )
            .await
            .unwrap();

        assert!(store
            .transition_stage(run.id, "a", &[StageStatus::Pending], StageStatus::Running)
            .await
            .unwrap());
        assert!(!store
            .transition_stage(run.id, "a", &[StageStatus::Pending], StageStatus::Running)
            .await
            .unwrap());

        let stage = store.stage(run.id, "a").unwrap();
        assert_eq!(stage.status, StageStatus::Running);
        assert!(stage.started_at.is_some());
    }

    #[tokio::test]
    async fn test_finish_run_only_once() {
        let store = InMemoryStore::new();
        let project_id = Uuid::new_v4();
        let run = store
            .create_run(
                NewPipelineRun {
                    project_id,
                    template_slug: "default".to_string(),
                    frozen_config: FrozenConfig::default(),
                },
                vec![],
            )
            .await
            .unwrap();

        assert!(store.finish_run(run.id, RunStatus::Completed).await.unwrap());
        assert!(!store.finish_run(run.id, RunStatus::Failed).await.unwrap());
        assert!(store.find_running_run(project_id).await.unwrap().is_none());
        assert_eq!(
            store.find_latest_run(project_id).await.unwrap().unwrap().status,
            RunStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_project_transition_guards_source_status() {
        let store = InMemoryStore::new();
        let project = Project::new(Uuid::new_v4(), None);
        let project_id = project.id;
        store.insert_project(project);

        assert!(!store
            .transition_project_status(project_id, &[ProjectStatus::Ingesting], ProjectStatus::WritingStory, 15)
            .await
            .unwrap());
        assert!(store
            .transition_project_status(project_id, &[ProjectStatus::Draft], ProjectStatus::Ingesting, 5)
            .await
            .unwrap());
        assert_eq!(store.project(project_id).unwrap().status, ProjectStatus::Ingesting);
    }
}
