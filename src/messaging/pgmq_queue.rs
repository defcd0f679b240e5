//! # pgmq Job Queue
//!
//! Sends jobs through the pgmq extension's SQL functions on the shared pool.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info, instrument};

use super::job_queue::{JobEnvelope, JobHandle, JobQueue, JobSpec};
use crate::error::QueueError;

#[derive(Debug, Clone)]
pub struct PgmqJobQueue {
    pool: PgPool,
}

impl PgmqJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create queues if they don't exist
    pub async fn ensure_queues(&self, queue_names: &[String]) -> Result<(), QueueError> {
        for queue_name in queue_names {
            debug!(queue = %queue_name, "Ensuring queue exists");
            sqlx::query("SELECT pgmq.create($1)")
                .bind(queue_name)
                .execute(&self.pool)
                .await
                .map_err(|e| QueueError::CreateFailed {
                    queue_name: queue_name.clone(),
                    reason: e.to_string(),
                })?;
        }
        info!(queues = queue_names.len(), "Job queues ready");
        Ok(())
    }
}

#[async_trait]
impl JobQueue for PgmqJobQueue {
    #[instrument(skip(self, job), fields(queue = %job.queue_name, job = %job.job_name))]
    async fn enqueue(&self, job: &JobSpec) -> Result<JobHandle, QueueError> {
        let envelope = serde_json::to_value(JobEnvelope::from(job))?;

        let message_id: i64 = sqlx::query_scalar("SELECT * FROM pgmq.send($1, $2, 0)")
            .bind(&job.queue_name)
            .bind(&envelope)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| QueueError::EnqueueFailed {
                queue_name: job.queue_name.clone(),
                job_name: job.job_name.clone(),
                reason: e.to_string(),
            })?;

        debug!(message_id = message_id, priority = job.priority, "Job enqueued");
        Ok(JobHandle {
            queue_name: job.queue_name.clone(),
            message_id,
        })
    }
}
