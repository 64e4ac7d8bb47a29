use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub networks: HashMap<String, NetworkConfig>,
    pub default_network: String,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub contracts: ContractsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub explorer_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Upper bound on any single RPC request.
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Addresses used when a subcommand is given no `--address`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractsConfig {
    pub nft: String,
    pub usdc: String,
}

impl Default for ContractsConfig {
    fn default() -> Self {
        Self {
            nft: "0x0483b0dfc6c78062b9e999a82ffb795925381415".to_string(),
            usdc: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut networks = HashMap::new();

        networks.insert(
            "ethereum".to_string(),
            NetworkConfig {
                rpc_url: "https://eth-mainnet.g.alchemy.com/v2/demo".to_string(),
                chain_id: 1,
                explorer_url: Some("https://etherscan.io".to_string()),
            },
        );

        networks.insert(
            "sepolia".to_string(),
            NetworkConfig {
                rpc_url: "https://eth-sepolia.g.alchemy.com/v2/demo".to_string(),
                chain_id: 11155111,
                explorer_url: Some("https://sepolia.etherscan.io".to_string()),
            },
        );

        networks.insert(
            "polygon".to_string(),
            NetworkConfig {
                rpc_url: "https://polygon-mainnet.g.alchemy.com/v2/demo".to_string(),
                chain_id: 137,
                explorer_url: Some("https://polygonscan.com".to_string()),
            },
        );

        networks.insert(
            "arbitrum".to_string(),
            NetworkConfig {
                rpc_url: "https://arb-mainnet.g.alchemy.com/v2/demo".to_string(),
                chain_id: 42161,
                explorer_url: Some("https://arbiscan.io".to_string()),
            },
        );

        Self {
            networks,
            default_network: "ethereum".to_string(),
            client: ClientConfig::default(),
            contracts: ContractsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {:?}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {:?}: {}", path, e))?;

        if !config.networks.contains_key(&config.default_network) {
            return Err(anyhow!(
                "Default network '{}' has no [networks.{}] section",
                config.default_network,
                config.default_network
            ));
        }

        Ok(config)
    }

    /// Load configuration with fallback to default
    pub async fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Self {
        let mut config = match path {
            Some(path) => match Self::load_from_file(path).await {
                Ok(config) => {
                    tracing::info!("Loaded configuration from file");
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to load config file, using defaults: {}", e);
                    Self::default()
                }
            },
            None => Self::default(),
        };

        if let Ok(api_key) = std::env::var("ALCHEMY_API_KEY") {
            config.apply_api_key(&api_key);
        } else {
            for (network_name, network_config) in &config.networks {
                if network_config.rpc_url.contains("/demo") {
                    tracing::warn!("Using demo RPC endpoint for {}, set ALCHEMY_API_KEY environment variable for better reliability", network_name);
                }
            }
        }

        config
    }

    /// Replace Alchemy demo and placeholder keys in every RPC URL.
    pub fn apply_api_key(&mut self, api_key: &str) {
        tracing::info!("Using ALCHEMY_API_KEY environment variable for RPC URLs");

        for (network_name, network_config) in &mut self.networks {
            if network_config.rpc_url.contains("alchemy.com/v2/demo") {
                network_config.rpc_url = network_config
                    .rpc_url
                    .replace("/demo", &format!("/{}", api_key));
                tracing::debug!("Updated {} RPC URL with API key", network_name);
            } else if network_config.rpc_url.contains("YOUR_API_KEY_HERE") {
                network_config.rpc_url = network_config
                    .rpc_url
                    .replace("YOUR_API_KEY_HERE", api_key);
                tracing::debug!("Updated {} RPC URL with API key", network_name);
            }
        }
    }

    /// Get default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("chain-reader").join("config.toml"))
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let sample_config = r#"# chain-reader configuration file

# Default network to use when none is specified
default_network = "ethereum"

[networks.ethereum]
rpc_url = "https://eth-mainnet.g.alchemy.com/v2/YOUR_API_KEY_HERE"
chain_id = 1
explorer_url = "https://etherscan.io"

[networks.sepolia]
rpc_url = "https://eth-sepolia.g.alchemy.com/v2/YOUR_API_KEY_HERE"
chain_id = 11155111
explorer_url = "https://sepolia.etherscan.io"

[networks.polygon]
rpc_url = "https://polygon-mainnet.g.alchemy.com/v2/YOUR_API_KEY_HERE"
chain_id = 137
explorer_url = "https://polygonscan.com"

[networks.arbitrum]
rpc_url = "https://arb-mainnet.g.alchemy.com/v2/YOUR_API_KEY_HERE"
chain_id = 42161
explorer_url = "https://arbiscan.io"

[client]
request_timeout_secs = 30

# Contracts used when --address is omitted
[contracts]
nft = "0x0483b0dfc6c78062b9e999a82ffb795925381415"
usdc = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"

# Environment variables that can be used:
# ALCHEMY_API_KEY - Your Alchemy API key (replaces YOUR_API_KEY_HERE above)
"#;
        sample_config.to_string()
    }
}
