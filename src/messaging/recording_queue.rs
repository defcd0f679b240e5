use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use super::job_queue::{JobHandle, JobQueue, JobSpec};
use crate::error::QueueError;

/// In-memory queue that records every enqueued job
#[derive(Debug, Default)]
pub struct RecordingJobQueue {
    jobs: Mutex<Vec<JobSpec>>,
    next_id: AtomicI64,
}

impl RecordingJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<JobSpec> {
        self.jobs.lock().clone()
    }

    pub fn jobs_named(&self, job_name: &str) -> Vec<JobSpec> {
        self.jobs
            .lock()
            .iter()
            .filter(|j| j.job_name == job_name)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    pub fn clear(&self) {
        self.jobs.lock().clear();
    }
}

#[async_trait]
impl JobQueue for RecordingJobQueue {
    async fn enqueue(&self, job: &JobSpec) -> Result<JobHandle, QueueError> {
        self.jobs.lock().push(job.clone());
        Ok(JobHandle {
            queue_name: job.queue_name.clone(),
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
        })
    }
}
