//! Configuration loading and environment construction shared by commands

use anyhow::{Context, Result};
use multidc_env::gateway::mock::{ScriptConfig, ScriptedConnector};
use multidc_env::prediction::maybe_augment;
use multidc_env::{EnvConfig, HierarchicalEnv, HierarchicalEnvironment};
use std::path::Path;
use tracing::info;

/// Load the environment configuration, layered with `MULTIDC_*` variables
pub fn load_config(path: Option<&Path>) -> Result<EnvConfig> {
    let config = EnvConfig::load(path).with_context(|| match path {
        Some(path) => format!("Failed to load config from {}", path.display()),
        None => "Failed to load config from the environment".to_string(),
    })?;
    info!(
        num_datacenters = config.datacenters.len(),
        batch_size = config.routing_batch_size(),
        "Configuration loaded"
    );
    Ok(config)
}

/// Build the environment, against the gateway or the scripted simulation
pub fn build_environment(
    config: &EnvConfig,
    dry_run: bool,
) -> Result<Box<dyn HierarchicalEnvironment>> {
    let env = if dry_run {
        let layout = config.layout();
        let script = ScriptConfig::new(
            layout.iter().map(|dc| (dc.host_count, dc.vm_count)).collect(),
            config.routing_batch_size(),
        );
        info!("Dry run, using the scripted simulation");
        HierarchicalEnv::with_connector(config.clone(), Box::new(ScriptedConnector::new(script)))
    } else {
        HierarchicalEnv::new(config.clone())
    }
    .context("Failed to create environment")?;

    maybe_augment(env, config).context("Failed to set up wind power prediction")
}
