#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Reel Pipeline
//!
//! Orchestration engine for multi-stage video generation projects.
//!
//! ## Overview
//!
//! A project moves through a pipeline of stages (ingestion, story writing,
//! per-scene image/video/audio generation, mixing, captions, assembly). Stages
//! are described by a [`PipelineTemplate`](models::PipelineTemplate), a DAG of
//! named stages. Each stage type has a [`StageHandler`](handlers::StageHandler)
//! that turns it into queue jobs and later decides, from durable state, whether
//! the stage is complete.
//!
//! Workers report every finished job. The orchestrator rescans, marks the stage
//! completed exactly once, and starts every stage whose dependencies are now
//! completed or skipped.
//!
//! ## Module Organization
//!
//! - [`models`] - Templates, runs, stage rows, projects and scenes
//! - [`state_machine`] - Run and stage status enums
//! - [`store`] - Persistence traits with Postgres and in-memory backends
//! - [`messaging`] - Job queue boundary (pgmq)
//! - [`handlers`] - Built-in stage handlers
//! - [`registry`] - Stage id to handler registry
//! - [`templates`] - Built-in default template and the template catalog
//! - [`orchestration`] - DAG engine, legacy chain and the dispatcher
//! - [`config`] - YAML configuration with environment overrides
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use reel_pipeline::config::PipelineConfig;
//! use reel_pipeline::orchestration::PipelineSystem;
//! use uuid::Uuid;
//!
//! # async fn example(project_id: Uuid, user_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
//! reel_pipeline::logging::init_structured_logging();
//!
//! let system = PipelineSystem::bootstrap(PipelineConfig::load()?).await?;
//! system.dispatcher.start_pipeline(project_id, user_id).await?;
//!
//! // Later, from a worker that finished a text-to-speech job
//! system
//!     .dispatcher
//!     .check_and_advance_pipeline(project_id, user_id, "tts")
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod orchestration;
pub mod registry;
pub mod state_machine;
pub mod store;
pub mod templates;

pub use config::PipelineConfig;
pub use error::{OrchestrationError, OrchestrationResult};
pub use orchestration::{
    AdvanceOutcome, DagOrchestrator, ExecutionMode, LegacyOrchestrator, Orchestrator,
    OrchestratorDeps, OrchestratorDispatcher, PipelineSystem,
};
pub use registry::StageHandlerRegistry;
pub use state_machine::{RunStatus, StageStatus};
