//! # Pipeline Bootstrap
//!
//! Builds a ready-to-use [`PipelineSystem`] from configuration: the Postgres
//! pool, migrations, pgmq queues, the stage handler registry, the template
//! catalog and the dispatcher over both orchestration strategies.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use super::dispatcher::OrchestratorDispatcher;
use super::types::OrchestratorDeps;
use crate::config::PipelineConfig;
use crate::error::{OrchestrationResult, StoreError};
use crate::messaging::PgmqJobQueue;
use crate::registry::default_registry;
use crate::store::{PgPipelineStore, PgProjectStore, ProjectStore};
use crate::templates::TemplateCatalog;

/// Handle to a fully wired orchestrator process
#[derive(Debug)]
pub struct PipelineSystem {
    pub config: PipelineConfig,
    pub pool: PgPool,
    pub dispatcher: OrchestratorDispatcher,
}

impl PipelineSystem {
    /// Load configuration from the environment and bootstrap
    pub async fn bootstrap_from_env() -> OrchestrationResult<Self> {
        let config = PipelineConfig::load()?;
        Self::bootstrap(config).await
    }

    pub async fn bootstrap(config: PipelineConfig) -> OrchestrationResult<Self> {
        config.validate()?;

        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .connect(&config.database.url)
            .await?;

        if config.database.run_migrations {
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(StoreError::from)?;
            info!("Database migrations applied");
        }

        let queue = PgmqJobQueue::new(pool.clone());
        queue.ensure_queues(&config.queues.queue_names()).await?;

        let mut catalog = TemplateCatalog::new();
        if let Some(directory) = &config.templates.directory {
            let loaded = catalog.load_directory(directory)?;
            info!(directory = %directory.display(), loaded, "Pipeline templates loaded");
        }

        let projects: Arc<dyn ProjectStore> = Arc::new(PgProjectStore::new(pool.clone()));
        let registry = default_registry(&config.queues, projects.clone());
        let deps = OrchestratorDeps {
            pipelines: Arc::new(PgPipelineStore::new(pool.clone())),
            projects,
            queue: Arc::new(queue),
            registry: Arc::new(registry),
            templates: Arc::new(catalog),
        };

        let dispatcher = OrchestratorDispatcher::from_deps(deps, &config.orchestration, &config.queues);
        info!(
            templates = dispatcher.generic().deps().templates.len(),
            stages = dispatcher.generic().deps().registry.len(),
            "Pipeline orchestrator ready"
        );

        Ok(Self {
            config,
            pool,
            dispatcher,
        })
    }
}
