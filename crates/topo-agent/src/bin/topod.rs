//! Main binary for the topology agent daemon (topod)

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use topo_agent::{init_agent, AgentConfig, Result};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "topod")]
#[command(about = "GPU topology agent daemon")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (overrides config)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Kubernetes node name (overrides config and NODE_NAME)
    #[arg(long, value_name = "NAME")]
    node_name: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect and report periodically
    Run,
    /// Collect once and print the matrix without reporting it
    Once,
    /// Generate default configuration
    Config {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate configuration
    Validate {
        /// Configuration file to validate
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run) | None => run_agent(&cli).await,
        Some(Commands::Once) => collect_once(&cli).await,
        Some(Commands::Config { ref output }) => generate_config(output.clone()),
        Some(Commands::Validate { ref config }) => validate_config(config.clone()),
    }
}

fn load_config(cli: &Cli) -> Result<AgentConfig> {
    let mut config = match cli.config {
        Some(ref config_path) => AgentConfig::from_file(config_path)?,
        None => AgentConfig::default(),
    };

    // Apply CLI overrides
    if let Some(ref log_level) = cli.log_level {
        config.logging.level = log_level.clone();
    }

    if let Some(ref node_name) = cli.node_name {
        config.node.name = node_name.clone();
    }

    Ok(config)
}

async fn run_agent(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let agent = init_agent(&config)?;

    info!("Starting topology agent for node: {}", config.node.name);

    if let Err(e) = agent.run().await {
        error!("Agent failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn collect_once(cli: &Cli) -> Result<()> {
    let mut config = load_config(cli)?;
    config.reporter.enabled = false;
    let agent = init_agent(&config)?;

    let matrix = agent.collect_once().await?;
    println!("{}", matrix.to_json()?);
    println!("{}", matrix.to_links().render_table());

    Ok(())
}

fn generate_config(output: Option<PathBuf>) -> Result<()> {
    let config = AgentConfig::default();

    if let Some(output_path) = output {
        config.to_file(&output_path)?;
        println!("Generated configuration file: {}", output_path.display());
    } else {
        println!("{}", serde_yaml::to_string(&config)?);
    }

    Ok(())
}

fn validate_config(config_path: PathBuf) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());

    let config = AgentConfig::from_file(&config_path)?;
    config.validate()?;

    println!("Configuration is valid");
    println!("Node: {}", config.node.name);
    println!("Annotation key: {}", config.node.annotation_key);
    println!("Collector: {} ({})", config.collector.kind, config.collector.backend);
    println!("Interval: {}s", config.collection.interval_seconds);
    if config.reporter.enabled {
        println!("Reporter: node annotation");
    } else {
        println!("Reporter: log only");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("topod.yaml");
        std::fs::write(&path, "node:\n  name: worker-3\nlogging:\n  level: debug\n").unwrap();
        path
    }

    #[test]
    fn test_config_log_level_kept_without_flag() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir);
        let cli = Cli::parse_from(["topod", "--config", path.to_str().unwrap()]);

        let config = load_config(&cli).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.node.name, "worker-3");
    }

    #[test]
    fn test_cli_flags_override_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir);
        let cli = Cli::parse_from([
            "topod",
            "--config",
            path.to_str().unwrap(),
            "--log-level",
            "warn",
            "--node-name",
            "worker-9",
            "once",
        ]);

        let config = load_config(&cli).unwrap();
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.node.name, "worker-9");
        assert!(matches!(cli.command, Some(Commands::Once)));
    }

    #[test]
    fn test_default_log_level_without_config() {
        let cli = Cli::parse_from(["topod"]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.logging.level, "info");
        assert!(cli.command.is_none());
    }
}
