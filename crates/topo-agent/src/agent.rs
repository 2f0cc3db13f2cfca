//! Core agent implementation

use crate::reporter::{LogReporter, NodeAnnotationReporter, TopologyReporter};
use crate::{config::AgentConfig, Result};
use std::future::Future;
use tokio::signal::ctrl_c;
use tokio::time::MissedTickBehavior;
use topo_adapter_gpu::{create_collector, TopologyCollector, TopologyMatrix};
use tracing::{debug, error, info, warn};

/// The topology agent: collect on a timer, publish each matrix
pub struct Agent {
    config: AgentConfig,
    collector: Box<dyn TopologyCollector>,
    reporter: Box<dyn TopologyReporter>,
}

impl Agent {
    /// Run one collection and publish the result
    pub async fn collect_once(&self) -> Result<TopologyMatrix> {
        let matrix = self.collector.collect().await?;
        self.reporter.report(&matrix).await?;
        Ok(matrix)
    }

    /// Collect periodically until `shutdown` resolves.
    ///
    /// The first run starts immediately. A failed run is logged and the
    /// loop waits for the next tick; no partial matrix is published. Failures
    /// that cannot clear on their own are logged at `error!` once.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let period = self.config.collection.effective_interval();
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            "Starting {} topology collection every {}s",
            self.collector.kind(),
            period.as_secs()
        );

        let mut reported_permanent = false;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Stopping topology collection");
                    break;
                }
                _ = ticker.tick() => {
                    match self.collect_once().await {
                        Ok(_) => reported_permanent = false,
                        Err(e) if e.is_retryable() => error!("Topology collection failed: {}", e),
                        Err(e) if !reported_permanent => {
                            error!("Topology collection failed and will keep failing: {}", e);
                            reported_permanent = true;
                        }
                        Err(e) => debug!("Topology collection failed: {}", e),
                    }
                }
            }
        }

        Ok(())
    }

    /// Run the agent until a termination signal is received
    pub async fn run(&self) -> Result<()> {
        self.run_until(wait_for_termination()).await
    }

    /// Get the agent configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}

async fn wait_for_termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM");
                    }
                    _ = ctrl_c() => {
                        info!("Received Ctrl+C signal");
                    }
                }
                return;
            }
            Err(e) => warn!("Failed to install SIGTERM handler: {}", e),
        }
    }

    if let Err(e) = ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C signal");
}

/// Builder for creating agents
pub struct AgentBuilder {
    config: Option<AgentConfig>,
    collector: Option<Box<dyn TopologyCollector>>,
    reporter: Option<Box<dyn TopologyReporter>>,
}

impl AgentBuilder {
    /// Create a new agent builder
    pub fn new() -> Self {
        Self {
            config: None,
            collector: None,
            reporter: None,
        }
    }

    /// Set the agent configuration
    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use this collector instead of the configured one
    pub fn with_collector(mut self, collector: Box<dyn TopologyCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Use this reporter instead of the configured one
    pub fn with_reporter(mut self, reporter: Box<dyn TopologyReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Build the agent
    pub fn build(self) -> Result<Agent> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let collector = match self.collector {
            Some(collector) => collector,
            None => create_collector(&config.collector)?,
        };

        let reporter: Box<dyn TopologyReporter> = match self.reporter {
            Some(reporter) => reporter,
            None if config.reporter.enabled => {
                Box::new(NodeAnnotationReporter::new(&config.reporter, &config.node)?)
            }
            None => {
                info!("Node annotation reporter disabled, logging matrices only");
                Box::new(LogReporter)
            }
        };

        Ok(Agent {
            config,
            collector,
            reporter,
        })
    }
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}
