//! # Models
//!
//! Static templates, durable run/stage records and the project-side rows the
//! orchestrator reads.

pub mod frozen_config;
pub mod pipeline_run;
pub mod pipeline_run_stage;
pub mod project;
pub mod scene;
pub mod template;

pub use frozen_config::FrozenConfig;
pub use pipeline_run::{NewPipelineRun, PipelineRun, RunSummary};
pub use pipeline_run_stage::{done_set, PipelineRunStage, StageProgress};
pub use project::{Project, ProjectStatus};
pub use scene::{active_scenes, Scene, SceneStatus, SceneTally};
pub use template::{is_stage_disabled, PipelineTemplate, StageDefinition};
