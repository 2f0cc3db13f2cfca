//! # topo-agent
//!
//! Node agent (topod daemon) for GPU topology discovery.
//!
//! The agent periodically collects the GPU interconnect matrix of the host
//! it runs on and publishes it as an annotation on its Kubernetes node, where
//! placement layers pick it up.

pub mod agent;
pub mod config;
pub mod reporter;

// Re-export commonly used types
pub use agent::{Agent, AgentBuilder};
pub use config::AgentConfig;
pub use reporter::{LogReporter, NodeAnnotationReporter, TopologyReporter};

// Error handling
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Topology error: {0}")]
    Topology(#[from] topo_adapter_gpu::TopologyError),

    #[error("Report error: {0}")]
    Report(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl AgentError {
    /// Check if a later collection cycle may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            AgentError::Topology(e) => e.is_retryable(),
            AgentError::Report(_) | AgentError::Http(_) | AgentError::Io(_) => true,
            AgentError::Config(_) | AgentError::Serialization(_) | AgentError::Yaml(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// Initialize the agent with logging and tracing
pub fn init_agent(config: &AgentConfig) -> Result<Agent> {
    init_logging(&config.logging)?;

    tracing::info!("Initializing topology agent with config: {:?}", config);

    AgentBuilder::new().with_config(config.clone()).build()
}

/// Initialize logging and tracing.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(logging_config: &config::LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging_config.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(logging_config.show_target)
        .with_thread_ids(logging_config.show_thread_ids)
        .with_line_number(logging_config.show_line_numbers);

    let result = match logging_config.format.as_str() {
        "json" => subscriber.json().try_init(),
        _ => subscriber.try_init(),
    };

    result.map_err(|e| AgentError::Config(format!("Failed to initialize logging: {}", e)))
}
