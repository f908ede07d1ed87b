//! Configuration and space inspection commands

use anyhow::Result;
use colored::Colorize;
use multidc_env::adapters::ParallelEnv;
use multidc_env::{EnvConfig, HierarchicalEnvironment, Space};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{print_success, print_table, OutputFormat};

/// Row for the datacenter table
#[derive(Debug, Serialize, Tabled)]
struct DatacenterRow {
    #[tabled(rename = "ID")]
    id: usize,
    #[tabled(rename = "Hosts")]
    hosts: usize,
    #[tabled(rename = "S/M/L VMs")]
    vm_mix: String,
    #[tabled(rename = "VMs")]
    vms: usize,
    #[tabled(rename = "Local actions")]
    actions: usize,
}

/// Row for the space table
#[derive(Debug, Serialize, Tabled)]
struct SpaceRow {
    #[tabled(rename = "Agent")]
    agent: String,
    #[tabled(rename = "Observation dim")]
    observation_dim: usize,
    #[tabled(rename = "Action space")]
    action_space: String,
}

fn describe(space: &Space) -> String {
    match space {
        Space::Discrete(n) => format!("Discrete({})", n),
        Space::MultiDiscrete(nvec) => match nvec.first() {
            Some(n) if nvec.iter().all(|m| m == n) => format!("MultiDiscrete([{}] x {})", n, nvec.len()),
            _ => format!("MultiDiscrete({:?})", nvec),
        },
        Space::Box { shape, dtype, .. } => format!("Box({:?}, {:?})", shape, dtype),
        Space::Dict(spaces) => format!("Dict({} keys)", spaces.len()),
    }
}

/// Validate a configuration and print what the simulator will receive
pub fn validate_config(config: &EnvConfig, simulator_json: bool, format: OutputFormat) -> Result<()> {
    config.validate()?;

    if simulator_json {
        println!("{}", config.to_simulator_json()?);
        return Ok(());
    }

    let rows: Vec<DatacenterRow> = config
        .datacenters
        .iter()
        .map(|dc| DatacenterRow {
            id: dc.datacenter_id,
            hosts: dc.hosts_count,
            vm_mix: format!(
                "{}/{}/{}",
                dc.initial_s_vm_count, dc.initial_m_vm_count, dc.initial_l_vm_count
            ),
            vms: dc.vm_count(),
            actions: dc.vm_count() + 1,
        })
        .collect();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        OutputFormat::Table => {
            println!("{}", "Environment Configuration".bold());
            println!("{}", "=".repeat(50));
            println!("Gateway:                {}", config.endpoint().cyan());
            println!(
                "Retries:                {} every {:.1}s",
                config.gateway_max_retries, config.gateway_retry_delay
            );
            println!("Routing batch size:     {}", config.routing_batch_size());
            match config.active_wind_prediction() {
                Some(wind) => println!(
                    "Wind prediction:        {} (horizon {}, history {})",
                    "enabled".green(),
                    wind.horizon,
                    wind.history_length
                ),
                None => println!("Wind prediction:        {}", "disabled".dimmed()),
            }
            println!();
            print_table(&rows, format);
            print_success("Configuration is valid");
        }
    }
    Ok(())
}

/// Print observation and action spaces for every agent
pub fn show_spaces<E: HierarchicalEnvironment>(env: E, format: OutputFormat) -> Result<()> {
    let shared = SpaceRow {
        agent: "local (shared)".to_string(),
        observation_dim: env.local_observation_space().flat_dim(),
        action_space: describe(&env.local_action_space()),
    };

    let parallel = ParallelEnv::new(env);
    let mut rows: Vec<SpaceRow> = parallel
        .possible_agents()
        .iter()
        .filter_map(|&agent| {
            let observation = parallel.observation_space(agent)?;
            let action = parallel.action_space(agent)?;
            Some(SpaceRow {
                agent: agent.to_string(),
                observation_dim: observation.flat_dim(),
                action_space: describe(&action),
            })
        })
        .collect();
    rows.push(shared);

    print_table(&rows, format);
    Ok(())
}
