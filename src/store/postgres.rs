//! # Postgres Stores
//!
//! `sqlx` implementations of [`PipelineStore`] and [`ProjectStore`]. Enums are
//! stored as text and parsed on the way out. Stage transitions are single
//! conditional `UPDATE`s, so the row count tells the caller whether it won.
//!
//! Schema lives in `migrations/0001_pipeline_runs.sql`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{PipelineStore, ProjectStore};
use crate::error::{StoreError, StoreResult};
use crate::models::{
    FrozenConfig, NewPipelineRun, PipelineRun, PipelineRunStage, Project, ProjectStatus, Scene,
    StageProgress,
};
use crate::state_machine::{RunStatus, StageStatus};

const RUN_COLUMNS: &str =
    "id, project_id, template_slug, status, frozen_config, current_stage_id, started_at, completed_at";
const STAGE_COLUMNS: &str =
    "run_id, stage_id, status, job_count, completed_jobs, failed_jobs, started_at, completed_at";

fn parse_column<T: std::str::FromStr>(column: &'static str, value: String) -> StoreResult<T> {
    value
        .parse()
        .map_err(|_| StoreError::InvalidColumn { column, value })
}

fn status_strings<T: ToString>(statuses: &[T]) -> Vec<String> {
    statuses.iter().map(ToString::to_string).collect()
}

#[derive(Debug, FromRow)]
struct RunRow {
    id: Uuid,
    project_id: Uuid,
    template_slug: String,
    status: String,
    frozen_config: serde_json::Value,
    current_stage_id: Option<String>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<RunRow> for PipelineRun {
    type Error = StoreError;

    fn try_from(row: RunRow) -> StoreResult<Self> {
        Ok(PipelineRun {
            id: row.id,
            project_id: row.project_id,
            template_slug: row.template_slug,
            status: parse_column::<RunStatus>("pipeline_runs.status", row.status)?,
            frozen_config: FrozenConfig::from_value(row.frozen_config),
            current_stage_id: row.current_stage_id,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct StageRow {
    run_id: Uuid,
    stage_id: String,
    status: String,
    job_count: i32,
    completed_jobs: i32,
    failed_jobs: i32,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<StageRow> for PipelineRunStage {
    type Error = StoreError;

    fn try_from(row: StageRow) -> StoreResult<Self> {
        Ok(PipelineRunStage {
            run_id: row.run_id,
            stage_id: row.stage_id,
            status: parse_column::<StageStatus>("pipeline_run_stages.status", row.status)?,
            job_count: row.job_count,
            completed_jobs: row.completed_jobs,
            failed_jobs: row.failed_jobs,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ProjectRow {
    id: Uuid,
    user_id: Uuid,
    template_id: Option<String>,
    status: String,
    progress: i32,
    visuals_approved_at: Option<DateTime<Utc>>,
    failure_reason: Option<String>,
}

impl TryFrom<ProjectRow> for Project {
    type Error = StoreError;

    fn try_from(row: ProjectRow) -> StoreResult<Self> {
        Ok(Project {
            id: row.id,
            user_id: row.user_id,
            template_id: row.template_id,
            status: parse_column::<ProjectStatus>("projects.status", row.status)?,
            progress: row.progress,
            visuals_approved_at: row.visuals_approved_at,
            failure_reason: row.failure_reason,
        })
    }
}

#[derive(Debug, FromRow)]
struct SceneRow {
    id: Uuid,
    project_id: Uuid,
    position: i32,
    status: String,
}

impl TryFrom<SceneRow> for Scene {
    type Error = StoreError;

    fn try_from(row: SceneRow) -> StoreResult<Self> {
        Ok(Scene {
            id: row.id,
            project_id: row.project_id,
            position: row.position,
            status: parse_column("scenes.status", row.status)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PgPipelineStore {
    pool: PgPool,
}

impl PgPipelineStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PipelineStore for PgPipelineStore {
    async fn create_run(
        &self,
        new_run: NewPipelineRun,
        stages: Vec<(String, StageStatus)>,
    ) -> StoreResult<PipelineRun> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, RunRow>(&format!(
            r#"
            INSERT INTO pipeline_runs (id, project_id, template_slug, status, frozen_config, started_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING {RUN_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new_run.project_id)
        .bind(&new_run.template_slug)
        .bind(RunStatus::Running.as_str())
        .bind(new_run.frozen_config.to_value())
        .fetch_one(&mut *tx)
        .await?;

        let (stage_ids, statuses): (Vec<String>, Vec<String>) = stages
            .into_iter()
            .map(|(stage_id, status)| (stage_id, status.to_string()))
            .unzip();

        sqlx::query(
            r#"
            INSERT INTO pipeline_run_stages (run_id, stage_id, status, completed_at)
            SELECT $1, s.stage_id, s.status,
                   CASE WHEN s.status = 'skipped' THEN NOW() END
            FROM UNNEST($2::text[], $3::text[]) AS s(stage_id, status)
            "#,
        )
        .bind(row.id)
        .bind(&stage_ids)
        .bind(&statuses)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn find_running_run(&self, project_id: Uuid) -> StoreResult<Option<PipelineRun>> {
        sqlx::query_as::<_, RunRow>(&format!(
            r#"
            SELECT {RUN_COLUMNS} FROM pipeline_runs
            WHERE project_id = $1 AND status = 'running'
            ORDER BY started_at DESC
            LIMIT 1
            "#
        ))
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?
        .map(PipelineRun::try_from)
        .transpose()
    }

    async fn find_latest_run(&self, project_id: Uuid) -> StoreResult<Option<PipelineRun>> {
        sqlx::query_as::<_, RunRow>(&format!(
            r#"
            SELECT {RUN_COLUMNS} FROM pipeline_runs
            WHERE project_id = $1
            ORDER BY started_at DESC
            LIMIT 1
            "#
        ))
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?
        .map(PipelineRun::try_from)
        .transpose()
    }

    async fn list_stages(&self, run_id: Uuid) -> StoreResult<Vec<PipelineRunStage>> {
        sqlx::query_as::<_, StageRow>(&format!(
            "SELECT {STAGE_COLUMNS} FROM pipeline_run_stages WHERE run_id = $1"
        ))
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(PipelineRunStage::try_from)
        .collect()
    }

    async fn get_stage(
        &self,
        run_id: Uuid,
        stage_id: &str,
    ) -> StoreResult<Option<PipelineRunStage>> {
        sqlx::query_as::<_, StageRow>(&format!(
            "SELECT {STAGE_COLUMNS} FROM pipeline_run_stages WHERE run_id = $1 AND stage_id = $2"
        ))
        .bind(run_id)
        .bind(stage_id)
        .fetch_optional(&self.pool)
        .await?
        .map(PipelineRunStage::try_from)
        .transpose()
    }

    async fn transition_stage(
        &self,
        run_id: Uuid,
        stage_id: &str,
        from: &[StageStatus],
        to: StageStatus,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE pipeline_run_stages
            SET status = $3,
                started_at = CASE WHEN $3 = 'running' THEN NOW() ELSE started_at END,
                completed_at = CASE WHEN $3 IN ('completed', 'skipped', 'failed') THEN NOW() ELSE completed_at END
            WHERE run_id = $1 AND stage_id = $2 AND status = ANY($4)
            "#,
        )
        .bind(run_id)
        .bind(stage_id)
        .bind(to.as_str())
        .bind(status_strings(from))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_job_count(
        &self,
        run_id: Uuid,
        stage_id: &str,
        job_count: i32,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE pipeline_run_stages SET job_count = $3 WHERE run_id = $1 AND stage_id = $2",
        )
        .bind(run_id)
        .bind(stage_id)
        .bind(job_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_progress(
        &self,
        run_id: Uuid,
        stage_id: &str,
        progress: StageProgress,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE pipeline_run_stages
            SET completed_jobs = $3, failed_jobs = $4, job_count = $5
            WHERE run_id = $1 AND stage_id = $2
            "#,
        )
        .bind(run_id)
        .bind(stage_id)
        .bind(progress.completed_jobs)
        .bind(progress.failed_jobs)
        .bind(progress.total_jobs)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_current_stage(&self, run_id: Uuid, stage_id: &str) -> StoreResult<()> {
        sqlx::query("UPDATE pipeline_runs SET current_stage_id = $2 WHERE id = $1")
            .bind(run_id)
            .bind(stage_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn finish_run(&self, run_id: Uuid, to: RunStatus) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE pipeline_runs SET status = $2, completed_at = NOW()
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(run_id)
        .bind(to.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(Debug, Clone)]
pub struct PgProjectStore {
    pool: PgPool,
}

impl PgProjectStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectStore for PgProjectStore {
    async fn get_project(&self, project_id: Uuid) -> StoreResult<Option<Project>> {
        sqlx::query_as::<_, ProjectRow>(
            r#"
            SELECT id, user_id, template_id, status, progress, visuals_approved_at, failure_reason
            FROM projects WHERE id = $1
            "#,
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Project::try_from)
        .transpose()
    }

    async fn update_project_progress(
        &self,
        project_id: Uuid,
        status: ProjectStatus,
        progress: i32,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE projects SET status = $2, progress = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(project_id)
        .bind(status.as_str())
        .bind(progress)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn transition_project_status(
        &self,
        project_id: Uuid,
        from: &[ProjectStatus],
        to: ProjectStatus,
        progress: i32,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE projects SET status = $2, progress = $3, updated_at = NOW()
            WHERE id = $1 AND status = ANY($4)
            "#,
        )
        .bind(project_id)
        .bind(to.as_str())
        .bind(progress)
        .bind(status_strings(from))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_project_failed(&self, project_id: Uuid, reason: &str) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE projects SET status = 'FAILED', failure_reason = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(project_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_scenes(&self, project_id: Uuid) -> StoreResult<Vec<Scene>> {
        sqlx::query_as::<_, SceneRow>(
            "SELECT id, project_id, position, status FROM scenes WHERE project_id = $1 ORDER BY position",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Scene::try_from)
        .collect()
    }

    async fn freeze_stage_config(&self, project_id: Uuid) -> StoreResult<FrozenConfig> {
        let config: Option<serde_json::Value> = sqlx::query_scalar(
            "SELECT config FROM project_stage_configs WHERE project_id = $1",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(config.map(FrozenConfig::from_value).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_status_column_is_reported() {
        let row = StageRow {
            run_id: Uuid::new_v4(),
            stage_id: "tts".to_string(),
            status: "in_progress".to_string(),
            job_count: 0,
            completed_jobs: 0,
            failed_jobs: 0,
            started_at: None,
            completed_at: None,
        };
        match PipelineRunStage::try_from(row) {
            Err(StoreError::InvalidColumn { column, value }) => {
                assert_eq!(column, "pipeline_run_stages.status");
                assert_eq!(value, "in_progress");
            }
            other => panic!("expected invalid column, got {other:?}"),
        }
    }

    #[test]
    fn test_status_strings_match_column_values() {
        assert_eq!(
            status_strings(&[StageStatus::Pending, StageStatus::Running]),
            vec!["pending".to_string(), "running".to_string()]
        );
        assert_eq!(
            status_strings(&[ProjectStatus::AwaitingApproval]),
            vec!["AWAITING_APPROVAL".to_string()]
        );
    }
}
