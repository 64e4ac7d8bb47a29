//! Scripted [`NodeClient`] for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use alloy::{
    dyn_abi::{DynSolValue, FunctionExt},
    json_abi::{Function, JsonAbi},
    primitives::{Address, Bytes, B256, U256},
};
use async_trait::async_trait;

use super::provider::{LogFilter, NodeClient, RawLog};
use crate::error::NodeError;

/// Answers `eth_call` by selector and counts every request it receives.
#[derive(Debug, Default)]
pub struct StubNode {
    calls: HashMap<[u8; 4], Result<Bytes, NodeError>>,
    logs: Option<Result<Vec<RawLog>, NodeError>>,
    head: Option<Result<u64, NodeError>>,
    call_count: AtomicUsize,
    logs_count: AtomicUsize,
    head_count: AtomicUsize,
    last_filter: Mutex<Option<LogFilter>>,
}

impl StubNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to `function` with its ABI-encoded `outputs`.
    pub fn with_output(self, abi: &JsonAbi, function: &str, outputs: &[DynSolValue]) -> Self {
        let function = &abi.function(function).expect("function in ABI")[0];
        self.with_function_output(function, outputs)
    }

    /// Like [`Self::with_output`] but for a specific overload.
    pub fn with_function_output(mut self, function: &Function, outputs: &[DynSolValue]) -> Self {
        let encoded = function.abi_encode_output(outputs).expect("encodable outputs");
        self.calls
            .insert(function.selector().0, Ok(Bytes::from(encoded)));
        self
    }

    pub fn with_call_error(mut self, abi: &JsonAbi, function: &str, error: NodeError) -> Self {
        let function = &abi.function(function).expect("function in ABI")[0];
        self.calls.insert(function.selector().0, Err(error));
        self
    }

    pub fn with_raw_output(mut self, abi: &JsonAbi, function: &str, raw: Bytes) -> Self {
        let function = &abi.function(function).expect("function in ABI")[0];
        self.calls.insert(function.selector().0, Ok(raw));
        self
    }

    pub fn with_logs(mut self, logs: Vec<RawLog>) -> Self {
        self.logs = Some(Ok(logs));
        self
    }

    pub fn with_logs_error(mut self, error: NodeError) -> Self {
        self.logs = Some(Err(error));
        self
    }

    pub fn with_head(mut self, head: u64) -> Self {
        self.head = Some(Ok(head));
        self
    }

    pub fn with_head_error(mut self, error: NodeError) -> Self {
        self.head = Some(Err(error));
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn logs_count(&self) -> usize {
        self.logs_count.load(Ordering::SeqCst)
    }

    pub fn head_count(&self) -> usize {
        self.head_count.load(Ordering::SeqCst)
    }

    pub fn total_requests(&self) -> usize {
        self.call_count() + self.logs_count() + self.head_count()
    }

    pub fn last_filter(&self) -> Option<LogFilter> {
        *self.last_filter.lock().unwrap()
    }
}

#[async_trait]
impl NodeClient for StubNode {
    async fn call(&self, _to: Address, data: Bytes) -> Result<Bytes, NodeError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let selector: [u8; 4] = data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| NodeError::Rpc {
                code: -32602,
                message: "calldata shorter than a selector".into(),
            })?;
        self.calls.get(&selector).cloned().unwrap_or_else(|| {
            Err(NodeError::Revert {
                message: "execution reverted".into(),
                data: Bytes::new(),
            })
        })
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, NodeError> {
        self.logs_count.fetch_add(1, Ordering::SeqCst);
        *self.last_filter.lock().unwrap() = Some(*filter);
        self.logs.clone().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn block_number(&self) -> Result<u64, NodeError> {
        self.head_count.fetch_add(1, Ordering::SeqCst);
        self.head.clone().unwrap_or(Ok(0))
    }
}

/// An ERC-20 `Transfer(from, to, value)` log.
pub fn transfer_log(
    topic0: B256,
    block: u64,
    log_index: u64,
    from: Address,
    to: Address,
    value: u64,
) -> RawLog {
    RawLog {
        block_number: Some(block),
        log_index: Some(log_index),
        transaction_hash: Some(B256::from(
            U256::from(block * 1_000 + log_index).to_be_bytes::<32>(),
        )),
        topics: vec![topic0, from.into_word(), to.into_word()],
        data: Bytes::from(U256::from(value).to_be_bytes::<32>().to_vec()),
    }
}
