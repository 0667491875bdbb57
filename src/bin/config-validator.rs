//! # Pipeline Configuration Validator
//!
//! Command-line tool for validating pipeline configuration files across
//! environments before starting the pipeline.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use submission_pipeline::config::{ConfigManager, PipelineConfig, StorageBackend};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate submission pipeline configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to validate (development, test, production, ...)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory path (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Ignore PIPELINE__* environment variable overrides
    #[arg(long)]
    files_only: bool,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate all configuration sections
    All,

    /// Validate one configuration section
    Component {
        /// batching, control_year, storage, transmission, notifications, cleanup, worker_pool
        name: String,
    },

    /// List environments that have an override file
    Environments,

    /// Print the effective configuration as JSON
    Show,
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
        Some(Commands::All) | None => validate_all_config(&cli),
        Some(Commands::Component { name }) => validate_component(&cli, name),
        Some(Commands::Environments) => list_environments(&cli),
        Some(Commands::Show) => show_config(&cli),
    };

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            process::exit(1);
        }
    }
}

fn load(cli: &Cli) -> Result<std::sync::Arc<ConfigManager>, Box<dyn std::error::Error>> {
    let manager = if cli.files_only {
        let dir = cli.config_dir.clone().unwrap_or_else(|| PathBuf::from("config"));
        ConfigManager::load_files_only(dir, &cli.environment)?
    } else {
        ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment)?
    };
    Ok(manager)
}

fn validate_all_config(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔧 Validating Pipeline Configuration");
    println!("Environment: {}", cli.environment);
    if let Some(config_dir) = &cli.config_dir {
        println!("Config Directory: {}", config_dir.display());
    }
    println!();

    let manager = match load(cli) {
        Ok(manager) => {
            println!("✅ Configuration loaded and validated");
            manager
        }
        Err(e) => {
            println!("❌ Failed to load configuration: {e}");
            println!("   This is the same error that pipeline bootstrap would encounter");
            return Err(e);
        }
    };

    let config = manager.config();
    println!("   ✅ Application id: {}", config.application_id);
    validate_batching_config(config)?;
    validate_control_year_config(config)?;
    validate_storage_config(config)?;
    validate_transmission_config(config)?;
    validate_delivery_config(config)?;
    validate_worker_pool_config(config)?;

    println!("\n🎉 All configuration validation checks passed!");
    Ok(())
}

fn validate_component(cli: &Cli, component_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔧 Validating Component: {component_name}");

    let manager = load(cli)?;
    let config = manager.config();

    match component_name.to_lowercase().as_str() {
        "batching" => validate_batching_config(config)?,
        "control_year" | "control-year" => validate_control_year_config(config)?,
        "storage" => validate_storage_config(config)?,
        "transmission" => validate_transmission_config(config)?,
        "notifications" | "cleanup" => validate_delivery_config(config)?,
        "worker_pool" | "worker-pool" => validate_worker_pool_config(config)?,
        _ => {
            return Err(format!("Unknown component: {component_name}").into());
        }
    }

    println!("✅ Component '{component_name}' validation passed!");
    Ok(())
}

fn list_environments(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = cli.config_dir.clone().unwrap_or_else(|| PathBuf::from("config"));
    println!("📋 Available Environments in {}:", config_dir.display());

    if !config_dir.is_dir() {
        println!("❌ Configuration directory not found: {}", config_dir.display());
        return Ok(());
    }

    let mut environments = Vec::new();
    for entry in std::fs::read_dir(&config_dir)? {
        let name = entry?.file_name().to_string_lossy().to_string();
        if let Some(env) = name
            .strip_prefix("pipeline.")
            .and_then(|rest| rest.strip_suffix(".toml"))
        {
            environments.push(env.to_string());
        }
    }
    environments.sort();

    for env in environments {
        println!("  • {env}");
    }
    Ok(())
}

fn show_config(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let manager = load(cli)?;
    println!("{}", serde_json::to_string_pretty(&manager.debug_config())?);
    Ok(())
}

fn validate_batching_config(config: &PipelineConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("📦 Validating Batching Configuration...");
    println!(
        "   ✅ Max batch size: {}, timeout: {}s",
        config.batching.max_batch_size, config.batching.batch_timeout_seconds
    );
    Ok(())
}

fn validate_control_year_config(config: &PipelineConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("📅 Validating Control Year Configuration...");
    match config.control_year.fixed {
        Some(year) => println!("   ✅ Fixed control year: {year}"),
        None => println!(
            "   ✅ Control year = current year - {}",
            config.control_year.offset
        ),
    }
    Ok(())
}

fn validate_storage_config(config: &PipelineConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("🗄️  Validating Storage Configuration...");
    println!("   ✅ Submissions root: {}", config.storage.submissions_root);
    match config.storage.backend {
        StorageBackend::Memory => {
            println!("   ⚠️  In-memory backend: batches do not survive a restart");
        }
        StorageBackend::LocalFs => {
            let root = &config.storage.local_root;
            if root.exists() && !root.is_dir() {
                return Err(format!("storage.local_root {} is not a directory", root.display()).into());
            }
            println!("   ✅ Local filesystem backend at {}", root.display());
        }
    }
    Ok(())
}

fn validate_transmission_config(config: &PipelineConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("📡 Validating Transmission Configuration...");
    let transmission = &config.transmission;
    if transmission.login_timeout_seconds == 0 {
        return Err("transmission.login_timeout_seconds must be greater than 0".into());
    }
    println!(
        "   ✅ Health probe every {}s, login timeout {}s, {} submit attempts",
        transmission.health_check_interval_seconds,
        transmission.login_timeout_seconds,
        transmission.max_submit_attempts
    );
    Ok(())
}

fn validate_delivery_config(config: &PipelineConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("📬 Validating Notification and Cleanup Configuration...");
    println!(
        "   ✅ Publish attempts: {} (backoff {}ms)",
        config.notifications.publish_attempts, config.notifications.retry_backoff_ms
    );
    println!(
        "   ✅ Delete attempts: {} (backoff {}ms)",
        config.cleanup.delete_attempts, config.cleanup.retry_backoff_ms
    );
    Ok(())
}

fn validate_worker_pool_config(config: &PipelineConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("👷 Validating Worker Pool Configuration...");
    if config.worker_pool.io_wait_ratio < 0.0 {
        return Err("worker_pool.io_wait_ratio cannot be negative".into());
    }
    println!(
        "   ✅ Effective pool size: {}",
        config.worker_pool.effective_size()
    );
    Ok(())
}
