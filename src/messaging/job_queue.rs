use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::QueueRoute;
use crate::error::QueueError;

/// One unit of work a stage hands to the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub queue_name: String,
    pub job_name: String,
    pub payload: Value,
    /// Lower is more urgent
    pub priority: i32,
}

impl JobSpec {
    pub fn from_route(route: &QueueRoute, payload: Value) -> Self {
        Self {
            queue_name: route.queue_name.clone(),
            job_name: route.job_name.clone(),
            payload,
            priority: route.priority,
        }
    }
}

/// Standard payload every stage job carries so the worker can report back
pub fn stage_job_payload(
    project_id: Uuid,
    user_id: Uuid,
    pipeline_run_id: Option<Uuid>,
    stage_id: &str,
    scene_id: Option<Uuid>,
) -> Value {
    json!({
        "projectId": project_id,
        "userId": user_id,
        "pipelineRunId": pipeline_run_id,
        "stageId": stage_id,
        "sceneId": scene_id,
    })
}

/// Message body written to the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub job_name: String,
    pub payload: Value,
    pub priority: i32,
    pub enqueued_at: DateTime<Utc>,
}

impl From<&JobSpec> for JobEnvelope {
    fn from(job: &JobSpec) -> Self {
        Self {
            job_name: job.job_name.clone(),
            payload: job.payload.clone(),
            priority: job.priority,
            enqueued_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub queue_name: String,
    pub message_id: i64,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &JobSpec) -> Result<JobHandle, QueueError>;
}
