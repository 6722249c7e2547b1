use std::env;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use lngraph::bitcoin::secp256k1::PublicKey;
use lngraph::graph::GraphConfig;
use log::*;

/// Network names
pub const NETWORK_NAMES: [&'static str; 4] = ["testnet", "regtest", "signet", "bitcoin"];

/// The network used when none is configured
pub const DEFAULT_NETWORK: &str = "bitcoin";

/// Hex public key of the local node
pub const LOCAL_NODE_VAR: &str = "LNGRAPH_LOCAL_NODE";

/// Network name, one of [NETWORK_NAMES]
pub const NETWORK_VAR: &str = "LNGRAPH_NETWORK";

/// Build a graph configuration from the environment
pub fn graph_config_from_env() -> Result<GraphConfig> {
    graph_config_from_vars(env::var(LOCAL_NODE_VAR).ok(), env::var(NETWORK_VAR).ok())
}

/// Build a graph configuration from raw variable values
pub fn graph_config_from_vars(
    local_node: Option<String>,
    network: Option<String>,
) -> Result<GraphConfig> {
    let local_node = local_node.ok_or_else(|| anyhow!("{} is not set", LOCAL_NODE_VAR))?;
    let local_node = PublicKey::from_str(local_node.trim())
        .map_err(|e| anyhow!("{}: bad public key {}: {}", LOCAL_NODE_VAR, local_node, e))?;
    let network = network.unwrap_or_else(|| DEFAULT_NETWORK.to_string());
    if !NETWORK_NAMES.contains(&network.as_str()) {
        return Err(anyhow!(
            "{}: unknown network {}, expected one of {}",
            NETWORK_VAR,
            network,
            NETWORK_NAMES.join(", ")
        ));
    }
    info!("graph for local node {} on {}", local_node, network);
    Ok(GraphConfig { local_node, network })
}
