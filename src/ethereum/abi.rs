use alloy::json_abi::JsonAbi;
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

/// ERC-721 contract queried by the `nft` command.
const ERC721_ABI: &str = include_str!("../../abis/erc721.json");

/// ERC-20 subset covering metadata, balances and `Transfer`.
const ERC20_ABI: &str = include_str!("../../abis/erc20.json");

pub const BUILTIN_NAMES: &[&str] = &["erc721", "erc20"];

/// Named, immutable ABIs loaded once and shared by reference.
#[derive(Debug, Default)]
pub struct AbiRegistry {
    abis: HashMap<String, Arc<JsonAbi>>,
}

impl AbiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with every built-in ABI.
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        for name in BUILTIN_NAMES {
            registry.insert(name, Self::builtin(name)?);
        }
        Ok(registry)
    }

    /// Parse one of the ABIs compiled into the binary.
    pub fn builtin(name: &str) -> Result<JsonAbi> {
        let source = match name {
            "erc721" => ERC721_ABI,
            "erc20" => ERC20_ABI,
            other => {
                return Err(anyhow!(
                    "Unknown built-in ABI '{}'. Available: {}",
                    other,
                    BUILTIN_NAMES.join(", ")
                ))
            }
        };
        parse_json_abi(source).map_err(|e| anyhow!("Built-in ABI '{}' is invalid: {}", name, e))
    }

    /// Build an ABI from human-readable signatures such as
    /// `function ownerOf(uint256 tokenId) view returns (address)`.
    pub fn parse_human_readable<'a, I>(signatures: I) -> Result<JsonAbi>
    where
        I: IntoIterator<Item = &'a str>,
    {
        JsonAbi::parse(signatures).map_err(|e| anyhow!("Failed to parse ABI signatures: {}", e))
    }

    /// Load a JSON ABI from disk and register it under `name`.
    ///
    /// Accepts a bare ABI array or a compiler artifact carrying an `abi` key.
    pub async fn load_file<P: AsRef<Path>>(&mut self, name: &str, path: P) -> Result<Arc<JsonAbi>> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read ABI file {:?}: {}", path, e))?;

        let abi = parse_json_abi(&content)
            .map_err(|e| anyhow!("Failed to parse ABI file {:?}: {}", path, e))?;

        info!("Loaded ABI '{}' from {:?}", name, path);
        Ok(self.insert(name, abi))
    }

    pub fn insert(&mut self, name: &str, abi: JsonAbi) -> Arc<JsonAbi> {
        let abi = Arc::new(abi);
        debug!(
            "Registered ABI '{}' ({} functions, {} events, {} errors)",
            name,
            abi.functions().count(),
            abi.events().count(),
            abi.errors().count()
        );
        self.abis.insert(name.to_string(), Arc::clone(&abi));
        abi
    }

    pub fn get(&self, name: &str) -> Result<Arc<JsonAbi>> {
        self.abis.get(name).cloned().ok_or_else(|| {
            let mut known: Vec<&str> = self.abis.keys().map(String::as_str).collect();
            known.sort_unstable();
            anyhow!("ABI '{}' not registered. Known ABIs: {}", name, known.join(", "))
        })
    }
}

fn parse_json_abi(content: &str) -> Result<JsonAbi> {
    let value: Value = serde_json::from_str(content)?;
    let abi_value = match value {
        Value::Object(mut artifact) => artifact
            .remove("abi")
            .ok_or_else(|| anyhow!("JSON object has no 'abi' field"))?,
        array @ Value::Array(_) => array,
        _ => return Err(anyhow!("expected an ABI array or an artifact with an 'abi' field")),
    };
    Ok(serde_json::from_value(abi_value)?)
}
