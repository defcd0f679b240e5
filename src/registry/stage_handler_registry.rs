//! # Stage Handler Registry
//!
//! Maps stage ids to the handler that prepares and checks that stage.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use reel_pipeline::config::QueueRoute;
//! use reel_pipeline::handlers::SingleJobHandler;
//! use reel_pipeline::registry::StageHandlerRegistry;
//!
//! # tokio_test::block_on(async {
//! let registry = StageHandlerRegistry::new();
//! registry.register(
//!     "thumbnail",
//!     Arc::new(SingleJobHandler::new(QueueRoute::new("thumbnails", "render-thumbnail", 3))),
//! );
//!
//! assert!(registry.get("thumbnail").is_some());
//! assert!(registry.get_required("missing").is_err());
//! # });
//! ```

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::QueueConfig;
use crate::constants::stage_ids;
use crate::error::RegistryError;
use crate::handlers::{SceneFanoutHandler, SingleJobHandler, StageHandler, VisualsApprovalHandler};
use crate::models::SceneStatus;
use crate::store::ProjectStore;

#[derive(Default)]
pub struct StageHandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn StageHandler>>>,
}

impl std::fmt::Debug for StageHandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageHandlerRegistry")
            .field("stage_ids", &self.stage_ids())
            .finish()
    }
}

impl StageHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; an existing registration is replaced with a warning
    pub fn register(&self, stage_id: impl Into<String>, handler: Arc<dyn StageHandler>) {
        let stage_id = stage_id.into();
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&stage_id) {
            warn!(stage_id = %stage_id, "Stage handler already registered, replacing");
        }
        handlers.insert(stage_id, handler);
    }

    /// Remove a registration, returning the handler that was registered
    pub fn unregister(&self, stage_id: &str) -> Option<Arc<dyn StageHandler>> {
        self.handlers.write().remove(stage_id)
    }

    pub fn get(&self, stage_id: &str) -> Option<Arc<dyn StageHandler>> {
        self.handlers.read().get(stage_id).cloned()
    }

    /// Lookup for paths where a missing handler is a deployment error
    pub fn get_required(&self, stage_id: &str) -> Result<Arc<dyn StageHandler>, RegistryError> {
        self.get(stage_id)
            .ok_or_else(|| RegistryError::HandlerNotFound {
                stage_id: stage_id.to_string(),
                known: self.stage_ids(),
            })
    }

    /// Registered stage ids, sorted
    pub fn stage_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handlers.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

/// Registry holding the handlers of every built-in stage
pub fn default_registry(
    queues: &QueueConfig,
    projects: Arc<dyn ProjectStore>,
) -> StageHandlerRegistry {
    let registry = StageHandlerRegistry::new();

    for stage_id in [
        stage_ids::INGESTION,
        stage_ids::STORY_WRITING,
        stage_ids::AUDIO_MIXING,
        stage_ids::CAPTION_GENERATION,
        stage_ids::ASSEMBLY,
    ] {
        registry.register(stage_id, Arc::new(SingleJobHandler::new(queues.route(stage_id))));
    }

    for (stage_id, target) in [
        (stage_ids::SCENE_GENERATION, SceneStatus::ImageReady),
        (stage_ids::VIDEO_GENERATION, SceneStatus::VideoReady),
        (stage_ids::TTS, SceneStatus::AudioReady),
    ] {
        registry.register(
            stage_id,
            Arc::new(SceneFanoutHandler::new(
                queues.route(stage_id),
                target,
                projects.clone(),
            )),
        );
    }

    registry.register(
        stage_ids::VISUALS_APPROVAL,
        Arc::new(VisualsApprovalHandler::new(projects)),
    );

    info!(handlers = registry.len(), "Default stage handlers registered");
    registry
}
