//! Decoding of revert payloads returned by `eth_call`.
//!
//! Revert data is `selector(4 bytes) ++ ABI-encoded arguments`. The selector
//! is matched against the contract's declared errors first, then against the
//! two payloads the Solidity compiler emits on its own: `Error(string)` for
//! `require`/`revert` messages and `Panic(uint256)` for failed assertions.

use alloy::{
    dyn_abi::{DynSolType, DynSolValue, JsonAbiExt},
    json_abi::JsonAbi,
    primitives::Bytes,
};

use super::DecodedParam;
use crate::error::RevertArgs;

/// The 4-byte selector for `Error(string)`.
pub const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// The 4-byte selector for `Panic(uint256)`.
pub const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

/// Name reported when the payload matches no known error.
pub const UNKNOWN_REVERT: &str = "unknown";

/// Decodes revert `data` into an error name and its arguments.
pub fn decode_revert(abi: &JsonAbi, data: &Bytes) -> (String, RevertArgs) {
    let raw = || (UNKNOWN_REVERT.to_string(), RevertArgs::Raw(data.clone()));

    if data.len() < 4 {
        return raw();
    }
    let (selector, payload) = data.split_at(4);

    for error in abi.errors() {
        if error.selector().as_slice() != selector {
            continue;
        }
        match error.abi_decode_input(payload, true) {
            Ok(values) => {
                let args = error
                    .inputs
                    .iter()
                    .zip(values)
                    .map(|(param, value)| DecodedParam::new(param.name.clone(), value))
                    .collect();
                return (error.name.clone(), RevertArgs::Decoded(args));
            }
            Err(e) => {
                tracing::debug!("Revert selector matched {} but decode failed: {}", error.name, e);
            }
        }
    }

    if selector == ERROR_STRING_SELECTOR.as_slice() {
        if let Some(args) = decode_builtin(payload, DynSolType::String, "message") {
            return ("Error".to_string(), RevertArgs::Decoded(args));
        }
    }

    if selector == PANIC_SELECTOR.as_slice() {
        if let Some(args) = decode_builtin(payload, DynSolType::Uint(256), "code") {
            return ("Panic".to_string(), RevertArgs::Decoded(args));
        }
    }

    raw()
}

fn decode_builtin(payload: &[u8], ty: DynSolType, name: &str) -> Option<Vec<DecodedParam>> {
    match DynSolType::Tuple(vec![ty]).abi_decode_params(payload).ok()? {
        DynSolValue::Tuple(mut values) if values.len() == 1 => {
            Some(vec![DecodedParam::new(name, values.remove(0))])
        }
        _ => None,
    }
}
