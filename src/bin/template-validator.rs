//! # Pipeline Template Validator
//!
//! Command-line tool for checking pipeline configuration and template files
//! before deploying them to orchestrator processes.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reel_pipeline::config::PipelineConfig;
use reel_pipeline::models::{is_stage_disabled, FrozenConfig, PipelineTemplate};
use reel_pipeline::templates::TemplateCatalog;
use std::path::PathBuf;
use std::process;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "template-validator")]
#[command(about = "Validate pipeline configuration and template files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment overlay to load (development, test, production)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory path (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Template directory, overriding `templates.directory` from configuration
    #[arg(short, long)]
    templates: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate configuration and every template
    All,

    /// Validate configuration only
    Config,

    /// Validate the template directory only
    Templates,

    /// Print the stage order of one template
    Show {
        /// Template id or slug
        template: String,

        /// Frozen config JSON used to mark disabled stages
        #[arg(long)]
        frozen_config: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::All) | None => validate_all(&cli),
        Some(Commands::Config) => load_config(&cli).map(|_| ()),
        Some(Commands::Templates) => load_catalog(&cli, None).map(|_| ()),
        Some(Commands::Show {
            template,
            frozen_config,
        }) => show_template(&cli, template, frozen_config.as_deref()),
    };

    match result {
        Ok(()) => {
            info!("Validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Validation failed: {e:#}");
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
    }
}

fn config_dir(cli: &Cli) -> PathBuf {
    cli.config_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("config"))
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let dir = config_dir(cli);
    println!("🔧 Validating configuration");
    println!("Environment: {}", cli.environment);
    println!("Config Directory: {}", dir.display());

    let config = PipelineConfig::load_from_directory_with_env(&dir, &cli.environment)
        .with_context(|| format!("loading configuration from {}", dir.display()))?;

    println!("   ✅ Database pool: max {} connections", config.database.max_connections);
    println!(
        "   ✅ Default template: {}",
        config.orchestration.default_template_id
    );
    println!(
        "   ✅ Legacy single-flight: {}",
        config.orchestration.legacy_single_flight
    );
    for queue in config.queues.queue_names() {
        println!("   ✅ Queue: {queue}");
    }
    Ok(config)
}

fn load_catalog(cli: &Cli, config: Option<&PipelineConfig>) -> Result<TemplateCatalog> {
    let directory = cli
        .templates
        .clone()
        .or_else(|| config.and_then(|c| c.templates.directory.clone()))
        .unwrap_or_else(|| config_dir(cli).join("templates"));

    println!("\n📁 Validating templates in {}", directory.display());
    let mut catalog = TemplateCatalog::new();
    if !directory.exists() {
        println!("   ℹ️  Template directory not found, only the built-in template is available");
        return Ok(catalog);
    }

    let loaded = catalog
        .load_directory(&directory)
        .with_context(|| format!("loading templates from {}", directory.display()))?;

    let mut templates: Vec<_> = catalog.templates().collect();
    templates.sort_by(|a, b| a.id.cmp(&b.id));
    for template in templates {
        println!(
            "   ✅ {} ({}): {} stages",
            template.id,
            template.slug,
            template.stages.len()
        );
    }
    println!("   Loaded {loaded} template file(s)");
    Ok(catalog)
}

fn validate_all(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    load_catalog(cli, Some(&config))?;
    println!("\n🎉 All validation checks passed!");
    Ok(())
}

fn show_template(cli: &Cli, id_or_slug: &str, frozen_config: Option<&str>) -> Result<()> {
    let catalog = load_catalog(cli, None)?;
    let Some(template) = catalog.get(id_or_slug) else {
        bail!("template '{id_or_slug}' not found");
    };

    let frozen_config = match frozen_config {
        Some(raw) => FrozenConfig::from_value(
            serde_json::from_str(raw).context("parsing --frozen-config as JSON")?,
        ),
        None => FrozenConfig::default(),
    };

    print_order(&template, &frozen_config)
}

fn print_order(template: &PipelineTemplate, frozen_config: &FrozenConfig) -> Result<()> {
    println!("\n📋 {} ({})", template.name, template.id);
    for (position, stage_id) in template.topological_order()?.into_iter().enumerate() {
        let Some(stage) = template.stage(stage_id) else {
            continue;
        };
        let deps = if stage.depends_on.is_empty() {
            "-".to_string()
        } else {
            stage.depends_on.join(", ")
        };
        let marker = if is_stage_disabled(stage, frozen_config) {
            " (skipped)"
        } else {
            ""
        };
        println!(
            "  {:>2}. {:<20} after [{}] -> {} {}%{}",
            position + 1,
            stage.stage_id,
            deps,
            stage.project_status_label.as_str(),
            stage.progress_percent,
            marker
        );
    }
    Ok(())
}

