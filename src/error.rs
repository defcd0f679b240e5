//! # Error Types
//!
//! Layered error enums for the orchestration engine. Each layer owns its own
//! error type and converts into [`OrchestrationError`] so `?` flows from the
//! stores, the queue and the stage handlers up to the orchestrator entry points.

use thiserror::Error;
use uuid::Uuid;

/// Errors raised while validating or loading pipeline templates
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Template '{template}' has no stages")]
    Empty { template: String },

    #[error("Template '{template}' declares stage '{stage_id}' more than once")]
    DuplicateStage { template: String, stage_id: String },

    #[error("Stage '{stage_id}' in template '{template}' depends on unknown stage '{dependency}'")]
    UnknownDependency {
        template: String,
        stage_id: String,
        dependency: String,
    },

    #[error("Template '{template}' contains a dependency cycle through: {stages:?}")]
    Cycle {
        template: String,
        stages: Vec<String>,
    },

    #[error("Scene stage '{later}' in template '{template}' must depend on '{earlier}'")]
    UnorderedSceneStages {
        template: String,
        earlier: String,
        later: String,
    },

    #[error("Template '{template}' is already registered")]
    DuplicateTemplate { template: String },

    #[error("Failed to read template file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse template file {path}: {reason}")]
    Parse { path: String, reason: String },
}

/// Errors raised by the stage handler registry
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("No handler registered for stage '{stage_id}'. Known stages: [{}]", known.join(", "))]
    HandlerNotFound { stage_id: String, known: Vec<String> },
}

/// Persistence errors from the run/stage and project stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid value '{value}' in column {column}")]
    InvalidColumn { column: &'static str, value: String },
}

/// Errors raised when handing work to the external job queue
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Failed to enqueue job '{job_name}' on queue '{queue_name}': {reason}")]
    EnqueueFailed {
        queue_name: String,
        job_name: String,
        reason: String,
    },

    #[error("Failed to create queue '{queue_name}': {reason}")]
    CreateFailed { queue_name: String, reason: String },

    #[error("Failed to serialize job payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by stage handlers
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Project {project_id} not found")]
    ProjectNotFound { project_id: Uuid },

    #[error("Handler for stage '{stage_id}' failed: {reason}")]
    Failed { stage_id: String, reason: String },
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// Top-level orchestration error returned by the orchestrator entry points
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),}

impl From<sqlx::Error> for OrchestrationError {
    fn from(err: sqlx::Error) -> Self {
        OrchestrationError::Store(StoreError::Database(err))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
pub type HandlerResult<T> = std::result::Result<T, HandlerError>;
pub type ConfigResult<T> = std::result::Result<T, ConfigurationError>;
pub type OrchestrationResult<T> = std::result::Result<T, OrchestrationError>;
