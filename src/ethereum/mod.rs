pub mod abi;
pub mod provider;
pub mod reader;
pub mod revert;
pub mod scanner;
pub mod utils;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::sync::Arc;

use alloy::{
    dyn_abi::DynSolValue,
    json_abi::JsonAbi,
    primitives::{Address, B256, U256},
};
use serde_json::{json, Map, Value};

use crate::error::QueryError;

/// A contract address paired with the ABI used to talk to it.
#[derive(Debug, Clone)]
pub struct ContractRef {
    address: Address,
    abi: Arc<JsonAbi>,
}

impl ContractRef {
    /// Validates `address` and binds it to `abi`.
    pub fn new(address: &str, abi: Arc<JsonAbi>) -> Result<Self, QueryError> {
        let address = utils::validate_address(address)?;
        Ok(Self { address, abi })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn abi(&self) -> &JsonAbi {
        &self.abi
    }
}

/// One decoded ABI parameter. `name` is empty for unnamed outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedParam {
    pub name: String,
    pub value: DynSolValue,
}

impl DecodedParam {
    pub fn new(name: impl Into<String>, value: DynSolValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Renders decoded params as a JSON object, falling back to positional keys
/// for unnamed entries.
pub fn params_to_json(params: &[DecodedParam]) -> Value {
    let mut map = Map::new();
    for (i, param) in params.iter().enumerate() {
        let key = if param.name.is_empty() {
            i.to_string()
        } else {
            param.name.clone()
        };
        map.insert(key, value::dyn_sol_value_to_json(&param.value));
    }
    Value::Object(map)
}

/// A read request: the target contract, a function name and JSON arguments
/// coerced against the declared input types at call time.
#[derive(Debug, Clone)]
pub struct FunctionCall {
    pub contract: ContractRef,
    pub function_name: String,
    pub args: Vec<Value>,
}

impl FunctionCall {
    pub fn new(contract: ContractRef, function_name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            contract,
            function_name: function_name.into(),
            args,
        }
    }
}

/// Successful result of a read-only call: one value per declared output.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutput {
    pub signature: String,
    pub outputs: Vec<DecodedParam>,
}

impl CallOutput {
    /// The first output, which is the whole result for single-return functions.
    pub fn value(&self) -> Option<&DynSolValue> {
        self.outputs.first().map(|p| &p.value)
    }

    pub fn to_json(&self) -> Value {
        let values: Vec<DynSolValue> = self.outputs.iter().map(|p| p.value.clone()).collect();
        json!({
            "function": self.signature,
            "result": value::dyn_sol_values_to_json(&values),
        })
    }
}

/// Result of [`reader::ContractReader::read`].
pub type CallResult = Result<CallOutput, QueryError>;

/// Upper bound of a log query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockBound {
    Number(u64),
    /// Resolved to the chain head once, at the start of the scan.
    Latest,
}

impl From<u64> for BlockBound {
    fn from(block: u64) -> Self {
        Self::Number(block)
    }
}

impl fmt::Display for BlockBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Latest => write!(f, "latest"),
        }
    }
}

/// Parameters of an event scan.
#[derive(Debug, Clone)]
pub struct LogQuery {
    pub contract: ContractRef,
    /// Bare event name (`Transfer`) or full signature
    /// (`Transfer(address,address,uint256)`).
    pub event_signature: String,
    pub from_block: u64,
    pub to_block: BlockBound,
    /// Unsigned-integer event input summed into the total.
    pub amount_field: String,
}

impl LogQuery {
    pub fn new(
        contract: ContractRef,
        event_signature: impl Into<String>,
        from_block: u64,
        to_block: impl Into<BlockBound>,
    ) -> Self {
        Self {
            contract,
            event_signature: event_signature.into(),
            from_block,
            to_block: to_block.into(),
            amount_field: "value".to_string(),
        }
    }

    #[must_use]
    pub fn with_amount_field(mut self, field: impl Into<String>) -> Self {
        self.amount_field = field.into();
        self
    }
}

/// A decoded event log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: B256,
    /// Event inputs in ABI-declared order.
    pub args: Vec<DecodedParam>,
}

impl LogEntry {
    pub fn arg(&self, name: &str) -> Option<&DynSolValue> {
        self.args.iter().find(|p| p.name == name).map(|p| &p.value)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "block_number": self.block_number,
            "log_index": self.log_index,
            "transaction_hash": format!("{:#x}", self.transaction_hash),
            "args": params_to_json(&self.args),
        })
    }
}

/// An integer token amount together with the token's decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAmount {
    raw: U256,
    decimals: u8,
}

impl TokenAmount {
    pub fn new(raw: U256, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    pub fn raw(&self) -> U256 {
        self.raw
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&utils::format_units(self.raw, self.decimals))
    }
}

/// Aggregate view over the logs returned by one scan.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferSummary {
    pub event: String,
    pub from_block: u64,
    /// Upper bound after `latest` resolution.
    pub to_block: u64,
    pub record_count: usize,
    pub earliest_block: Option<u64>,
    pub latest_block: Option<u64>,
    pub total_amount: TokenAmount,
    amount_field: String,
    entries: Vec<LogEntry>,
}

impl TransferSummary {
    pub(crate) fn new(
        event: String,
        from_block: u64,
        to_block: u64,
        amount_field: String,
        entries: Vec<LogEntry>,
        total_amount: TokenAmount,
    ) -> Self {
        Self {
            event,
            from_block,
            to_block,
            record_count: entries.len(),
            earliest_block: entries.first().map(|e| e.block_number),
            latest_block: entries.last().map(|e| e.block_number),
            total_amount,
            amount_field,
            entries,
        }
    }

    /// `false` when the range held no matching logs.
    pub fn has_activity(&self) -> bool {
        self.record_count > 0
    }

    /// Entries in chain order (block, then log index).
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Entries newest first: the exact reverse of [`Self::entries`].
    pub fn reversed(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().rev()
    }

    /// The entry's amount scaled with the summary's decimals.
    pub fn amount_of(&self, entry: &LogEntry) -> Option<TokenAmount> {
        match entry.arg(&self.amount_field) {
            Some(DynSolValue::Uint(raw, _)) => {
                Some(TokenAmount::new(*raw, self.total_amount.decimals()))
            }
            _ => None,
        }
    }

    pub fn to_json(&self, newest_first: bool, limit: Option<usize>) -> Value {
        let limit = limit.unwrap_or(self.entries.len());
        let entries: Vec<Value> = if newest_first {
            self.reversed().take(limit).map(LogEntry::to_json).collect()
        } else {
            self.entries.iter().take(limit).map(LogEntry::to_json).collect()
        };

        json!({
            "event": self.event,
            "from_block": self.from_block,
            "to_block": self.to_block,
            "record_count": self.record_count,
            "has_activity": self.has_activity(),
            "earliest_block": self.earliest_block,
            "latest_block": self.latest_block,
            "total_amount": self.total_amount.to_string(),
            "decimals": self.total_amount.decimals(),
            "entries": entries,
        })
    }
}
