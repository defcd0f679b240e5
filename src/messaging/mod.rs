//! # Messaging
//!
//! The external job queue boundary. Delivery is at-least-once; the
//! orchestrator does not deduplicate jobs at this boundary.

pub mod job_queue;
pub mod pgmq_queue;
pub mod recording_queue;

pub use job_queue::{JobEnvelope, JobHandle, JobQueue, JobSpec};
pub use pgmq_queue::PgmqJobQueue;
pub use recording_queue::RecordingJobQueue;
