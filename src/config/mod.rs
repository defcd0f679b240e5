//! # Pipeline Configuration
//!
//! YAML-driven configuration with environment overlays and `REEL__` environment
//! variable overrides, loaded through the `config` crate.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use reel_pipeline::config::PipelineConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::load()?;
//! let route = config.queues.route("tts");
//! println!("tts jobs go to {}", route.queue_name);
//! # Ok(())
//! # }
//! ```

pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::constants::{queues, stage_ids, DEFAULT_TEMPLATE_ID};
use crate::error::{ConfigResult, ConfigurationError};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub database: DatabaseConfig,
    pub queues: QueueConfig,
    pub orchestration: OrchestrationConfig,
    pub templates: TemplateConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.url.trim().is_empty() {
            return Err(invalid("database.url", "must not be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(invalid("database.max_connections", "must be greater than zero"));
        }
        if self.orchestration.default_template_id.trim().is_empty() {
            return Err(invalid("orchestration.default_template_id", "must not be empty"));
        }
        for (stage_id, route) in &self.queues.routes {
            if route.queue_name.trim().is_empty() {
                return Err(invalid(
                    &format!("queues.routes.{stage_id}.queue_name"),
                    "must not be empty",
                ));
            }
            if route.job_name.trim().is_empty() {
                return Err(invalid(
                    &format!("queues.routes.{stage_id}.job_name"),
                    "must not be empty",
                ));
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigurationError {
    ConfigurationError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/reel_development".to_string(),
            max_connections: 10,
            run_migrations: false,
        }
    }
}

/// Where a stage's jobs are sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRoute {
    pub queue_name: String,
    pub job_name: String,
    /// Lower is more urgent
    #[serde(default = "default_priority")]
    pub priority: i32,
}

fn default_priority() -> i32 {
    5
}

impl QueueRoute {
    pub fn new(queue_name: &str, job_name: &str, priority: i32) -> Self {
        Self {
            queue_name: queue_name.to_string(),
            job_name: job_name.to_string(),
            priority,
        }
    }
}

/// Stage id to queue routing. Only overrides are stored; built-in stages
/// fall back to their default routes and unknown stages to a queue named
/// after the stage.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub routes: HashMap<String, QueueRoute>,
}

impl QueueConfig {
    pub fn route(&self, stage_id: &str) -> QueueRoute {
        if let Some(route) = self.routes.get(stage_id) {
            return route.clone();
        }
        builtin_route(stage_id)
            .unwrap_or_else(|| QueueRoute::new(stage_id, stage_id, default_priority()))
    }

    /// Every distinct queue the built-in stages and overrides use
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = stage_ids::ALL
            .iter()
            .map(|stage_id| self.route(stage_id).queue_name)
            .chain(self.routes.values().map(|r| r.queue_name.clone()))
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

fn builtin_route(stage_id: &str) -> Option<QueueRoute> {
    let route = match stage_id {
        stage_ids::INGESTION => QueueRoute::new(queues::INGESTION, "ingest-source", 1),
        stage_ids::STORY_WRITING => QueueRoute::new(queues::STORY, "write-story", 2),
        stage_ids::SCENE_GENERATION => QueueRoute::new(queues::IMAGE, "generate-scene-image", 3),
        // Approval is inline; the route only names the job in logs
        stage_ids::VISUALS_APPROVAL => QueueRoute::new(queues::IMAGE, "await-visuals-approval", 3),
        stage_ids::VIDEO_GENERATION => QueueRoute::new(queues::VIDEO, "generate-scene-video", 4),
        stage_ids::TTS => QueueRoute::new(queues::AUDIO, "generate-scene-audio", 3),
        stage_ids::AUDIO_MIXING => QueueRoute::new(queues::AUDIO, "mix-audio", 2),
        stage_ids::CAPTION_GENERATION => QueueRoute::new(queues::CAPTIONS, "generate-captions", 2),
        stage_ids::ASSEMBLY => QueueRoute::new(queues::ASSEMBLY, "assemble-video", 1),
        _ => return None,
    };
    Some(route)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Template id that routes a project to the legacy chain
    pub default_template_id: String,
    /// Guard legacy advancement with a conditional project status transition
    pub legacy_single_flight: bool,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            default_template_id: DEFAULT_TEMPLATE_ID.to_string(),
            legacy_single_flight: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Directory of `*.yaml` template files loaded into the catalog
    pub directory: Option<PathBuf>,
}
