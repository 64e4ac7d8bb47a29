use crate::config::{Config, NetworkConfig};
use crate::error::NodeError;
use alloy::{
    primitives::{Address, Bytes, B256},
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::types::{Filter, TransactionRequest},
    transports::{
        http::{Client, Http},
        RpcError, TransportError, TransportResult,
    },
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;

/// Inclusive block range restricted to one contract and one event topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    pub topic0: B256,
    pub from_block: u64,
    pub to_block: u64,
}

/// A log as returned by `eth_getLogs`, before ABI decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub block_number: Option<u64>,
    pub log_index: Option<u64>,
    pub transaction_hash: Option<B256>,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

/// The three node operations the readers depend on.
#[async_trait]
pub trait NodeClient: Send + Sync + Debug {
    /// `eth_call` against the latest block.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, NodeError>;

    /// `eth_getLogs`.
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, NodeError>;

    /// `eth_blockNumber`.
    async fn block_number(&self) -> Result<u64, NodeError>;
}

/// [`NodeClient`] over an alloy HTTP provider, with a per-request timeout.
#[derive(Debug, Clone)]
pub struct AlloyNode {
    provider: RootProvider<Http<Client>>,
    timeout: Duration,
}

impl AlloyNode {
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self> {
        let url = rpc_url
            .parse()
            .map_err(|e| anyhow!("Invalid RPC URL '{}': {}", rpc_url, e))?;
        let provider = ProviderBuilder::new().on_http(url);

        Ok(Self { provider, timeout })
    }

    async fn with_timeout<T, F>(&self, request: F) -> Result<T, NodeError>
    where
        F: Future<Output = TransportResult<T>>,
    {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result.map_err(classify_transport_error),
            Err(_) => Err(NodeError::Timeout {
                ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

#[async_trait]
impl NodeClient for AlloyNode {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, NodeError> {
        let call_request = TransactionRequest::default().to(to).input(data.into());
        tracing::debug!("eth_call to {}", to);
        self.with_timeout(self.provider.call(&call_request).into_future())
            .await
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, NodeError> {
        let rpc_filter = Filter::new()
            .address(filter.address)
            .event_signature(filter.topic0)
            .from_block(filter.from_block)
            .to_block(filter.to_block);

        tracing::debug!(
            "eth_getLogs for {} in [{}, {}]",
            filter.address,
            filter.from_block,
            filter.to_block
        );

        let logs = self
            .with_timeout(self.provider.get_logs(&rpc_filter).into_future())
            .await?;

        Ok(logs
            .into_iter()
            .map(|log| RawLog {
                block_number: log.block_number,
                log_index: log.log_index,
                transaction_hash: log.transaction_hash,
                topics: log.topics().to_vec(),
                data: log.data().data.clone(),
            })
            .collect())
    }

    async fn block_number(&self) -> Result<u64, NodeError> {
        self.with_timeout(self.provider.get_block_number().into_future())
            .await
    }
}

/// Maps alloy transport failures onto [`NodeError`], keeping revert data.
pub fn classify_transport_error(error: TransportError) -> NodeError {
    if let Some(payload) = error.as_error_resp() {
        let message = payload.message.to_string();
        if let Some(data) = payload.as_revert_data() {
            return NodeError::Revert { message, data };
        }
        if message.contains("execution reverted") {
            return NodeError::Revert {
                message,
                data: Bytes::new(),
            };
        }
        return NodeError::Rpc {
            code: payload.code,
            message,
        };
    }

    match error {
        RpcError::DeserError { err, .. } => NodeError::MalformedResponse(err.to_string()),
        RpcError::NullResp => NodeError::MalformedResponse("server returned a null response".into()),
        other => NodeError::Http(other.to_string()),
    }
}

/// One [`AlloyNode`] per configured network.
#[derive(Debug)]
pub struct ProviderManager {
    nodes: HashMap<String, Arc<AlloyNode>>,
    config: Config,
}

impl ProviderManager {
    pub fn new(config: Config) -> Result<Self> {
        let mut nodes = HashMap::new();
        let timeout = config.client.request_timeout();

        for (network_name, network_config) in &config.networks {
            let node = Self::create_node(network_config, timeout)?;
            nodes.insert(network_name.clone(), Arc::new(node));
        }

        Ok(Self { nodes, config })
    }

    fn create_node(network_config: &NetworkConfig, timeout: Duration) -> Result<AlloyNode> {
        AlloyNode::new(&network_config.rpc_url, timeout)
    }

    pub fn get_node(&self, network: Option<&str>) -> Result<Arc<AlloyNode>> {
        let network_name = network.unwrap_or(&self.config.default_network);
        self.nodes
            .get(network_name)
            .cloned()
            .ok_or_else(|| anyhow!("Network '{}' not found", network_name))
    }

    pub fn get_network_config(&self, network: Option<&str>) -> Result<&NetworkConfig> {
        let network_name = network.unwrap_or(&self.config.default_network);
        self.config
            .networks
            .get(network_name)
            .ok_or_else(|| anyhow!("Network '{}' not configured", network_name))
    }

    pub fn get_available_networks(&self) -> Vec<String> {
        let mut names: Vec<String> = self.config.networks.keys().cloned().collect();
        names.sort();
        names
    }
}
