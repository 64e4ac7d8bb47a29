use alloy::{
    dyn_abi::{DynSolValue, EventExt},
    json_abi::{Event, JsonAbi},
    primitives::U256,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    provider::{LogFilter, NodeClient, RawLog},
    reader::ContractReader,
    utils, BlockBound, ContractRef, DecodedParam, LogEntry, LogQuery, TokenAmount,
    TransferSummary,
};
use crate::error::{NodeError, QueryError, ScanPhase};

/// Retrieves and aggregates the logs of one event over a block range.
///
/// A scan issues at most three requests, strictly in sequence: `decimals()`,
/// `eth_blockNumber` (only for a `latest` upper bound) and one `eth_getLogs`.
/// The range is not split; endpoints that cap `eth_getLogs` must be given a
/// narrower range by the caller.
#[derive(Debug)]
pub struct EventScanner<C: ?Sized> {
    client: Arc<C>,
    reader: ContractReader<C>,
}

impl<C: NodeClient + ?Sized> EventScanner<C> {
    pub fn new(client: Arc<C>) -> Self {
        let reader = ContractReader::new(Arc::clone(&client));
        Self { client, reader }
    }

    pub async fn scan(&self, query: &LogQuery) -> Result<TransferSummary, QueryError> {
        let abi = query.contract.abi();
        let event = resolve_event(abi, &query.event_signature)?;
        validate_amount_field(event, &query.amount_field)?;
        if let BlockBound::Number(to) = query.to_block {
            utils::validate_block_range(query.from_block, to)?;
        }

        let decimals = self.fetch_decimals(&query.contract).await?;

        let to_block = match query.to_block {
            BlockBound::Number(to) => to,
            BlockBound::Latest => self
                .client
                .block_number()
                .await
                .map_err(|e| QueryError::scan(ScanPhase::ResolveHead, e))?,
        };

        let signature = event.signature();
        if query.from_block > to_block {
            debug!(
                "From block {} is past the chain head {}; nothing to fetch",
                query.from_block, to_block
            );
            return Ok(TransferSummary::new(
                signature,
                query.from_block,
                to_block,
                query.amount_field.clone(),
                Vec::new(),
                TokenAmount::new(U256::ZERO, decimals),
            ));
        }

        let filter = LogFilter {
            address: query.contract.address(),
            topic0: event.selector(),
            from_block: query.from_block,
            to_block,
        };
        let raw_logs = self
            .client
            .get_logs(&filter)
            .await
            .map_err(|e| QueryError::scan(ScanPhase::FetchLogs, e))?;

        let mut entries = raw_logs
            .iter()
            .enumerate()
            .map(|(position, log)| decode_log(event, log, position))
            .collect::<Result<Vec<_>, NodeError>>()
            .map_err(|e| QueryError::scan(ScanPhase::Decode, e))?;
        if sort_canonical(&mut entries) {
            warn!(
                contract = %query.contract.address(),
                "node returned logs out of (block, log index) order; reordered"
            );
        }

        let total = sum_amounts(&entries, &query.amount_field)
            .map_err(|e| QueryError::scan(ScanPhase::Decode, e))?;

        info!(
            event = %signature,
            contract = %query.contract.address(),
            from_block = query.from_block,
            to_block,
            records = entries.len(),
            "scan complete"
        );

        Ok(TransferSummary::new(
            signature,
            query.from_block,
            to_block,
            query.amount_field.clone(),
            entries,
            TokenAmount::new(total, decimals),
        ))
    }

    async fn fetch_decimals(&self, token: &ContractRef) -> Result<u8, QueryError> {
        let unavailable = |e: QueryError| QueryError::DecimalsUnavailable(Box::new(e));

        let output = self
            .reader
            .read(token, "decimals", &[])
            .await
            .map_err(unavailable)?;

        match output.value() {
            Some(DynSolValue::Uint(value, _)) if *value <= U256::from(u8::MAX) => {
                Ok(value.to::<u8>())
            }
            other => Err(unavailable(QueryError::Transport(
                NodeError::MalformedResponse(format!(
                    "decimals() returned {:?}, expected a uint8",
                    other
                )),
            ))),
        }
    }
}

/// Finds the event by bare name or by full signature.
pub fn resolve_event<'a>(abi: &'a JsonAbi, signature: &str) -> Result<&'a Event, QueryError> {
    let wanted: String = signature.chars().filter(|c| !c.is_whitespace()).collect();
    let invalid = |reason: String| QueryError::InvalidEvent {
        name: signature.to_string(),
        reason,
    };

    let candidates: Vec<&Event> = if wanted.contains('(') {
        abi.events().filter(|e| e.signature() == wanted).collect()
    } else {
        abi.events().filter(|e| e.name == wanted).collect()
    };

    match candidates.as_slice() {
        [event] if event.anonymous => Err(invalid(
            "anonymous events have no signature topic to filter on".to_string(),
        )),
        [event] => Ok(*event),
        [] => {
            let available: Vec<String> = abi.events().map(Event::signature).collect();
            Err(invalid(format!(
                "not found in ABI. Available events: {}",
                if available.is_empty() {
                    "none".to_string()
                } else {
                    available.join(", ")
                }
            )))
        }
        _ => Err(invalid(
            "ambiguous name; pass the full signature instead".to_string(),
        )),
    }
}

fn validate_amount_field(event: &Event, field: &str) -> Result<(), QueryError> {
    let param = event
        .inputs
        .iter()
        .find(|p| p.name == field)
        .ok_or_else(|| QueryError::InvalidEvent {
            name: event.name.clone(),
            reason: format!("has no input named '{}' to sum", field),
        })?;

    if !param.ty.starts_with("uint") || param.ty.ends_with(']') {
        return Err(QueryError::InvalidEvent {
            name: event.name.clone(),
            reason: format!("input '{}' is {}, expected an unsigned integer", field, param.ty),
        });
    }
    Ok(())
}

/// Decodes one log; indexed inputs come from topics, the rest from data, and
/// the result follows ABI declaration order.
fn decode_log(event: &Event, log: &RawLog, position: usize) -> Result<LogEntry, NodeError> {
    let malformed = |what: String| NodeError::MalformedResponse(format!("log #{}: {}", position, what));

    let block_number = log
        .block_number
        .ok_or_else(|| malformed("missing block number".to_string()))?;
    let log_index = log
        .log_index
        .ok_or_else(|| malformed("missing log index".to_string()))?;
    let transaction_hash = log
        .transaction_hash
        .ok_or_else(|| malformed("missing transaction hash".to_string()))?;

    let decoded = event
        .decode_log_parts(log.topics.iter().copied(), &log.data, true)
        .map_err(|e| malformed(format!("cannot decode {}: {}", event.name, e)))?;

    let mut indexed = decoded.indexed.into_iter();
    let mut body = decoded.body.into_iter();
    let mut args = Vec::with_capacity(event.inputs.len());
    for input in &event.inputs {
        let source = if input.indexed { &mut indexed } else { &mut body };
        let value = source
            .next()
            .ok_or_else(|| malformed(format!("missing value for '{}'", input.name)))?;
        args.push(DecodedParam::new(input.name.clone(), value));
    }

    Ok(LogEntry {
        block_number,
        log_index,
        transaction_hash,
        args,
    })
}

/// Puts entries in (block, log index) order. Returns `true` when the node's
/// order had to be changed.
fn sort_canonical(entries: &mut [LogEntry]) -> bool {
    let key = |entry: &LogEntry| (entry.block_number, entry.log_index);
    if entries.windows(2).all(|w| key(&w[0]) <= key(&w[1])) {
        return false;
    }
    entries.sort_by_key(key);
    true
}

fn sum_amounts(entries: &[LogEntry], field: &str) -> Result<U256, NodeError> {
    entries.iter().try_fold(U256::ZERO, |total, entry| match entry.arg(field) {
        Some(DynSolValue::Uint(amount, _)) => total.checked_add(*amount).ok_or_else(|| {
            NodeError::MalformedResponse(format!("sum of '{}' overflows uint256", field))
        }),
        other => Err(NodeError::MalformedResponse(format!(
            "'{}' in block {} decoded as {:?}, expected an unsigned integer",
            field, entry.block_number, other
        ))),
    })
}
