use alloy::primitives::{Address, U256};
use anyhow::{anyhow, Result};
use std::str::FromStr;

use crate::error::QueryError;

/// Validates an address of the form `0x` + 40 hex characters.
pub fn validate_address(address: &str) -> Result<Address, QueryError> {
    let invalid = || QueryError::InvalidAddress(address.to_string());

    let hex_part = address.strip_prefix("0x").ok_or_else(invalid)?;
    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    // Mixed-case input is accepted without enforcing the EIP-55 checksum.
    Address::from_str(address).map_err(|_| invalid())
}

/// Validates network name
pub fn validate_network(network: &str, available_networks: &[String]) -> Result<()> {
    if network.is_empty() {
        return Err(anyhow!("Network name cannot be empty"));
    }

    if !available_networks.iter().any(|n| n == network) {
        return Err(anyhow!(
            "Unknown network: '{}'. Available networks: {}",
            network,
            available_networks.join(", ")
        ));
    }

    Ok(())
}

/// Rejects names that cannot be Solidity identifiers.
pub fn validate_function_name(function_name: &str) -> Result<(), QueryError> {
    let invalid = |reason: &str| QueryError::InvalidFunction {
        name: function_name.to_string(),
        reason: reason.to_string(),
    };

    let first = function_name
        .chars()
        .next()
        .ok_or_else(|| invalid("function name cannot be empty"))?;

    if !first.is_ascii_alphabetic() && first != '_' && first != '$' {
        return Err(invalid("must start with a letter or underscore"));
    }

    if !function_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
    {
        return Err(invalid("may only contain letters, digits and underscores"));
    }

    Ok(())
}

/// Validates an explicit numeric block range.
pub fn validate_block_range(from: u64, to: u64) -> Result<(), QueryError> {
    if from > to {
        return Err(QueryError::InvalidBlockRange { from, to });
    }
    Ok(())
}

/// Formats a raw integer amount with `decimals` fractional digits, trimming
/// trailing zeros (`3500000`, 6 → `3.5`).
pub fn format_units(value: U256, decimals: u8) -> String {
    if decimals == 0 {
        return value.to_string();
    }

    let digits = value.to_string();
    let scale = decimals as usize;
    let (whole, fraction) = if digits.len() > scale {
        let (w, f) = digits.split_at(digits.len() - scale);
        (w.to_string(), f.to_string())
    } else {
        ("0".to_string(), format!("{:0>width$}", digits, width = scale))
    };

    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole
    } else {
        format!("{}.{}", whole, fraction)
    }
}

/// Creates user-friendly error messages for common RPC errors
pub fn interpret_rpc_error(error: &str) -> String {
    let lower = error.to_lowercase();
    if lower.contains("execution reverted") {
        "Call reverted: the contract rejected the call. Check the function arguments and the token or account being queried.".to_string()
    } else if lower.contains("connection refused") || lower.contains("network unreachable") {
        "Network error: Cannot connect to RPC endpoint. Check your internet connection and RPC URL configuration.".to_string()
    } else if lower.contains("timed out") || lower.contains("timeout") {
        "Network error: Request timed out. The RPC endpoint may be overloaded or unreachable."
            .to_string()
    } else if lower.contains("rate limit") || lower.contains("429") {
        "Rate limit error: Too many requests to the RPC endpoint. Try again in a few moments or use a different endpoint.".to_string()
    } else if lower.contains("method not found") {
        "RPC error: The requested method is not supported by this RPC endpoint. Try using a different endpoint.".to_string()
    } else if lower.contains("block range") || lower.contains("query returned more than") {
        "RPC error: The endpoint limits log queries. Narrow the block range and try again."
            .to_string()
    } else {
        format!("RPC error: {}", error)
    }
}
