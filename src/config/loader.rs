//! Configuration Loader
//!
//! Environment-aware loading: `pipeline.yaml` base file, optional
//! `pipeline.<env>.yaml` overlay, then `REEL__SECTION__KEY` environment
//! variables. Missing files are allowed; defaults fill every gap.

use config::{Config, Environment, File};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::PipelineConfig;
use crate::error::ConfigResult;
use crate::logging::get_environment;

impl PipelineConfig {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Self> {
        Self::load_from_directory(&default_config_directory())
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: &Path) -> ConfigResult<Self> {
        Self::load_from_directory_with_env(config_dir, &get_environment())
    }

    /// Load configuration from a specific directory with explicit environment
    pub fn load_from_directory_with_env(config_dir: &Path, environment: &str) -> ConfigResult<Self> {
        debug!(
            environment = environment,
            directory = %config_dir.display(),
            "Loading pipeline configuration"
        );

        let config: PipelineConfig = Config::builder()
            .add_source(File::from(config_dir.join("pipeline.yaml")).required(false))
            .add_source(
                File::from(config_dir.join(format!("pipeline.{environment}.yaml"))).required(false),
            )
            .add_source(Environment::with_prefix("REEL").separator("__"))
            .build()?
            .try_deserialize()?;

        config.validate()?;

        debug!(
            environment = environment,
            max_connections = config.database.max_connections,
            default_template_id = %config.orchestration.default_template_id,
            "Pipeline configuration loaded"
        );
        Ok(config)
    }
}

fn default_config_directory() -> PathBuf {
    std::env::var("REEL_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_environment_overlay_overrides_base_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("pipeline.yaml"),
            r#"
database:
  url: postgresql://db/reel
  max_connections: 20
orchestration:
  legacy_single_flight: true
queues:
  routes:
    tts:
      queue_name: tts-gpu
      job_name: synthesize
"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("pipeline.staging.yaml"),
            "orchestration:\n  legacy_single_flight: false\n",
        )
        .unwrap();

        let config = PipelineConfig::load_from_directory_with_env(dir.path(), "staging").unwrap();
        assert_eq!(config.database.url, "postgresql://db/reel");
        assert_eq!(config.database.max_connections, 20);
        assert!(!config.orchestration.legacy_single_flight);
        assert_eq!(config.orchestration.default_template_id, "default");

        let route = config.queues.route("tts");
        assert_eq!(route.queue_name, "tts-gpu");
        assert_eq!(route.priority, 5);
    }

    #[test]
    fn test_missing_files_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::load_from_directory_with_env(dir.path(), "nowhere").unwrap();
        assert_eq!(config.database.max_connections, 10);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("pipeline.yaml"),
            "database:\n  max_connections: 0\n",
        )
        .unwrap();
        assert!(PipelineConfig::load_from_directory_with_env(dir.path(), "test").is_err());
    }
}
