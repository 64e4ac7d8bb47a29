//! Conversions between JSON values and dynamically typed Solidity values.
//!
//! Call arguments arrive as JSON (numbers, strings, booleans, arrays) and are
//! coerced against the ABI-declared input type. Decoded results go the other
//! way for presentation.

use alloy::{
    dyn_abi::{DynSolType, DynSolValue, Word},
    primitives::{I256, U256},
};
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::str::FromStr;

use super::utils;

/// Convert JSON value to DynSolValue based on expected Solidity type
pub fn json_to_dyn_sol_value(value: &Value, sol_type: &DynSolType) -> Result<DynSolValue> {
    match sol_type {
        DynSolType::Address => {
            let addr_str = value
                .as_str()
                .ok_or_else(|| anyhow!("address must be a string"))?;
            let address = utils::validate_address(addr_str)?;
            Ok(DynSolValue::Address(address))
        }
        DynSolType::Uint(bits) => {
            let num = match value {
                Value::Number(n) => n
                    .as_u64()
                    .map(U256::from)
                    .ok_or_else(|| anyhow!("{} is not an unsigned integer", n))?,
                Value::String(s) => {
                    U256::from_str(s).map_err(|_| anyhow!("invalid uint string: {}", s))?
                }
                _ => return Err(anyhow!("uint must be a number or string")),
            };
            if num.bit_len() > *bits {
                return Err(anyhow!("{} does not fit in uint{}", num, bits));
            }
            Ok(DynSolValue::Uint(num, *bits))
        }
        DynSolType::Int(bits) => {
            let num = match value {
                Value::Number(n) if n.is_i64() || n.is_u64() => I256::from_dec_str(&n.to_string())
                    .map_err(|_| anyhow!("invalid int value: {}", n))?,
                Value::String(s) => match s.strip_prefix("0x") {
                    Some(_) => I256::from_hex_str(s),
                    None => I256::from_dec_str(s),
                }
                .map_err(|_| anyhow!("invalid int string: {}", s))?,
                _ => return Err(anyhow!("int must be an integer number or string")),
            };
            if !fits_signed(num, *bits) {
                return Err(anyhow!("{} does not fit in int{}", num, bits));
            }
            Ok(DynSolValue::Int(num, *bits))
        }
        DynSolType::String => {
            let s = value
                .as_str()
                .ok_or_else(|| anyhow!("string parameter must be a string"))?;
            Ok(DynSolValue::String(s.to_string()))
        }
        DynSolType::Bool => {
            let b = value
                .as_bool()
                .ok_or_else(|| anyhow!("bool parameter must be a boolean"))?;
            Ok(DynSolValue::Bool(b))
        }
        DynSolType::FixedBytes(size) => {
            let bytes = decode_hex(value)?;
            if bytes.len() != *size {
                return Err(anyhow!(
                    "bytes{} expects {} bytes, got {}",
                    size,
                    size,
                    bytes.len()
                ));
            }

            let mut word_bytes = [0u8; 32];
            word_bytes[..bytes.len()].copy_from_slice(&bytes);
            Ok(DynSolValue::FixedBytes(Word::from(word_bytes), *size))
        }
        DynSolType::Bytes => Ok(DynSolValue::Bytes(decode_hex(value)?)),
        DynSolType::Array(inner) => {
            let array = value
                .as_array()
                .ok_or_else(|| anyhow!("array parameter must be an array"))?;
            let items = array
                .iter()
                .map(|item| json_to_dyn_sol_value(item, inner))
                .collect::<Result<Vec<_>>>()?;
            Ok(DynSolValue::Array(items))
        }
        DynSolType::FixedArray(inner, len) => {
            let array = value
                .as_array()
                .ok_or_else(|| anyhow!("array parameter must be an array"))?;
            if array.len() != *len {
                return Err(anyhow!(
                    "fixed array expects {} elements, got {}",
                    len,
                    array.len()
                ));
            }
            let items = array
                .iter()
                .map(|item| json_to_dyn_sol_value(item, inner))
                .collect::<Result<Vec<_>>>()?;
            Ok(DynSolValue::FixedArray(items))
        }
        DynSolType::Tuple(types) => {
            let array = value
                .as_array()
                .ok_or_else(|| anyhow!("tuple parameter must be an array of components"))?;
            if array.len() != types.len() {
                return Err(anyhow!(
                    "tuple expects {} components, got {}",
                    types.len(),
                    array.len()
                ));
            }
            let items = array
                .iter()
                .zip(types)
                .map(|(item, ty)| json_to_dyn_sol_value(item, ty))
                .collect::<Result<Vec<_>>>()?;
            Ok(DynSolValue::Tuple(items))
        }
        other => Err(anyhow!("unsupported Solidity type: {}", other)),
    }
}

fn decode_hex(value: &Value) -> Result<Vec<u8>> {
    let hex_str = value
        .as_str()
        .ok_or_else(|| anyhow!("bytes must be a hex string"))?;
    let digits = hex_str
        .strip_prefix("0x")
        .ok_or_else(|| anyhow!("hex string must start with 0x: {}", hex_str))?;
    hex::decode(digits).map_err(|_| anyhow!("invalid hex string: {}", hex_str))
}

fn fits_signed(num: I256, bits: usize) -> bool {
    if bits >= 256 {
        return true;
    }
    let bound = U256::from(1u8) << (bits - 1);
    let magnitude = num.unsigned_abs();
    if num.is_negative() {
        magnitude <= bound
    } else {
        magnitude < bound
    }
}

/// Convert DynSolValue array to JSON
pub fn dyn_sol_values_to_json(values: &[DynSolValue]) -> Value {
    match values {
        [] => Value::Null,
        [single] => dyn_sol_value_to_json(single),
        many => Value::Array(many.iter().map(dyn_sol_value_to_json).collect()),
    }
}

/// Convert single DynSolValue to JSON
pub fn dyn_sol_value_to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Address(addr) => Value::String(addr.to_checksum(None)),
        DynSolValue::Uint(num, _) => Value::String(num.to_string()),
        DynSolValue::Int(num, _) => Value::String(num.to_string()),
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Bytes(bytes) => Value::String(format!("0x{}", hex::encode(bytes))),
        DynSolValue::FixedBytes(word, size) => {
            Value::String(format!("0x{}", hex::encode(&word[..*size])))
        }
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(dyn_sol_value_to_json).collect())
        }
        other => Value::String(format!("{:?}", other)),
    }
}
