use alloy::{
    dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt, Specifier},
    json_abi::{Function, JsonAbi, StateMutability},
    primitives::Bytes,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::{
    provider::NodeClient, revert, utils, CallOutput, CallResult, ContractRef, DecodedParam,
    FunctionCall,
};
use crate::error::{NodeError, QueryError};

/// Performs read-only (`view`/`pure`) contract calls.
///
/// Each `read` validates the function and arguments locally, issues exactly
/// one `eth_call` and decodes the result. Nothing is retried.
#[derive(Debug)]
pub struct ContractReader<C: ?Sized> {
    client: Arc<C>,
}

impl<C: ?Sized> Clone for ContractReader<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
        }
    }
}

impl<C: NodeClient + ?Sized> ContractReader<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    pub async fn read(
        &self,
        contract: &ContractRef,
        function_name: &str,
        args: &[Value],
    ) -> CallResult {
        let function = resolve_view_function(contract.abi(), function_name, args.len())?;
        let calldata = encode_function_call(function, args)?;

        debug!(
            "Calling {} on {} with {} argument(s)",
            function.signature(),
            contract.address(),
            args.len()
        );

        match self.client.call(contract.address(), calldata).await {
            Ok(result_bytes) => decode_function_result(function, &result_bytes),
            Err(NodeError::Revert { message, data }) => {
                let (name, args) = revert::decode_revert(contract.abi(), &data);
                debug!("{} reverted ({}): {}", function.name, message, name);
                Err(QueryError::ContractRevert { name, args })
            }
            Err(e) => {
                debug!("{} failed: {}", function.name, e);
                Err(QueryError::Transport(e))
            }
        }
    }

    pub async fn execute(&self, call: &FunctionCall) -> CallResult {
        self.read(&call.contract, &call.function_name, &call.args)
            .await
    }
}

/// Finds the single `view`/`pure` overload of `name` taking `arity` inputs.
pub fn resolve_view_function<'a>(
    abi: &'a JsonAbi,
    name: &str,
    arity: usize,
) -> Result<&'a Function, QueryError> {
    utils::validate_function_name(name)?;

    let invalid = |reason: String| QueryError::InvalidFunction {
        name: name.to_string(),
        reason,
    };

    let overloads = abi.function(name).ok_or_else(|| {
        let available: Vec<&str> = abi
            .functions()
            .filter(|f| is_read_only(f))
            .map(|f| f.name.as_str())
            .collect();
        if available.is_empty() {
            invalid("not found; the ABI declares no view functions".to_string())
        } else {
            invalid(format!(
                "not found in ABI. Available view functions: {}",
                available.join(", ")
            ))
        }
    })?;

    let readable: Vec<&Function> = overloads.iter().filter(|f| is_read_only(f)).collect();
    if readable.is_empty() {
        return Err(invalid(format!(
            "is {}; only view and pure functions can be read",
            mutability_name(overloads[0].state_mutability)
        )));
    }

    let same_arity: Vec<&Function> = overloads
        .iter()
        .filter(|f| f.inputs.len() == arity)
        .collect();
    let mut matching = same_arity.iter().filter(|f| is_read_only(f));
    match (matching.next(), matching.next()) {
        (Some(function), None) => Ok(*function),
        (Some(_), Some(_)) => Err(invalid(format!(
            "ambiguous: more than one overload takes {} argument(s)",
            arity
        ))),
        (None, _) if !same_arity.is_empty() => Err(invalid(format!(
            "overload taking {} argument(s) is {}; only view and pure functions can be read",
            arity,
            mutability_name(same_arity[0].state_mutability)
        ))),
        (None, _) => {
            let expected: Vec<String> = readable
                .iter()
                .map(|f| {
                    let params: Vec<String> = f
                        .inputs
                        .iter()
                        .map(|input| format!("{} {}", input.ty, input.name).trim().to_string())
                        .collect();
                    format!("[{}]", params.join(", "))
                })
                .collect();
            Err(QueryError::ArgumentType {
                function: name.to_string(),
                reason: format!(
                    "got {} argument(s), expected parameters: {}",
                    arity,
                    expected.join(" or ")
                ),
            })
        }
    }
}

fn is_read_only(function: &Function) -> bool {
    matches!(
        function.state_mutability,
        StateMutability::View | StateMutability::Pure
    )
}

fn mutability_name(mutability: StateMutability) -> &'static str {
    match mutability {
        StateMutability::Pure => "pure",
        StateMutability::View => "view",
        StateMutability::NonPayable => "nonpayable",
        StateMutability::Payable => "payable",
    }
}

/// Encode function parameters for a contract call
fn encode_function_call(function: &Function, args: &[Value]) -> Result<Bytes, QueryError> {
    let arg_error = |reason: String| QueryError::ArgumentType {
        function: function.signature(),
        reason,
    };

    let mut dyn_values = Vec::with_capacity(args.len());
    for (i, (input, arg)) in function.inputs.iter().zip(args).enumerate() {
        let expected_type = input.resolve().map_err(|e| {
            arg_error(format!(
                "parameter #{} has unsupported type '{}': {}",
                i + 1,
                input.ty,
                e
            ))
        })?;
        let dyn_value = super::value::json_to_dyn_sol_value(arg, &expected_type).map_err(|e| {
            arg_error(format!(
                "parameter #{} ('{}' of type '{}'): {}",
                i + 1,
                input.name,
                input.ty,
                e
            ))
        })?;
        dyn_values.push(dyn_value);
    }

    let encoded = function
        .abi_encode_input(&dyn_values)
        .map_err(|e| arg_error(format!("failed to encode inputs: {}", e)))?;

    Ok(encoded.into())
}

/// Decode function call result
fn decode_function_result(function: &Function, result_bytes: &Bytes) -> CallResult {
    let signature = function.signature();

    if result_bytes.is_empty() && !function.outputs.is_empty() {
        return Err(QueryError::Transport(NodeError::MalformedResponse(format!(
            "{} returned no data; is the address a contract?",
            signature
        ))));
    }

    let decoded: Vec<DynSolValue> = function
        .abi_decode_output(result_bytes, true)
        .map_err(|e| {
            QueryError::Transport(NodeError::MalformedResponse(format!(
                "cannot decode {} output: {}",
                signature, e
            )))
        })?;

    let outputs = function
        .outputs
        .iter()
        .zip(decoded)
        .map(|(param, value)| DecodedParam::new(param.name.clone(), value))
        .collect();

    Ok(CallOutput { signature, outputs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RevertArgs;
    use crate::ethereum::{abi::AbiRegistry, testing::StubNode};
    use alloy::{
        dyn_abi::DynSolType,
        primitives::{Address, B256, U256},
    };
    use serde_json::json;

    const NFT: &str = "0x0483b0dfc6c78062b9e999a82ffb795925381415";

    fn nft() -> (Arc<JsonAbi>, ContractRef) {
        let abi = Arc::new(AbiRegistry::builtin("erc721").unwrap());
        let contract = ContractRef::new(NFT, Arc::clone(&abi)).unwrap();
        (abi, contract)
    }

    fn owner() -> Address {
        "0xABCDabcdABCDabcdABCDabcdABCDabcdABCDabcd".parse().unwrap()
    }

    #[tokio::test]
    async fn test_owner_and_token_uri() {
        let (abi, contract) = nft();
        let node = Arc::new(
            StubNode::new()
                .with_output(&abi, "ownerOf", &[DynSolValue::Address(owner())])
                .with_output(
                    &abi,
                    "tokenURI",
                    &[DynSolValue::String("ipfs://QmT3wMgcmm/1.json".into())],
                ),
        );
        let reader = ContractReader::new(Arc::clone(&node));

        let owner_result = reader.read(&contract, "ownerOf", &[json!(1)]).await.unwrap();
        assert_eq!(owner_result.signature, "ownerOf(uint256)");
        assert_eq!(owner_result.value(), Some(&DynSolValue::Address(owner())));

        let uri = reader
            .read(&contract, "tokenURI", &[json!("1")])
            .await
            .unwrap();
        assert_eq!(
            uri.value(),
            Some(&DynSolValue::String("ipfs://QmT3wMgcmm/1.json".into()))
        );
        assert_eq!(node.call_count(), 2);
    }

    #[tokio::test]
    async fn test_decoded_types_match_declared_outputs() {
        let (abi, contract) = nft();
        let root = B256::repeat_byte(0x11);
        let node = Arc::new(
            StubNode::new()
                .with_output(&abi, "name", &[DynSolValue::String("Collection".into())])
                .with_output(&abi, "totalSupply", &[DynSolValue::Uint(U256::from(500), 256)])
                .with_output(&abi, "publicMintEnabled", &[DynSolValue::Bool(true)])
                .with_output(&abi, "wlroot1", &[DynSolValue::FixedBytes(root, 32)]),
        );
        let reader = ContractReader::new(node);

        for name in ["name", "totalSupply", "publicMintEnabled", "wlroot1"] {
            let output = reader.read(&contract, name, &[]).await.unwrap();
            let declared = &abi.function(name).unwrap()[0].outputs;
            assert_eq!(output.outputs.len(), declared.len());
            for (param, decoded) in declared.iter().zip(&output.outputs) {
                let ty: DynSolType = param.resolve().unwrap();
                assert!(ty.matches(&decoded.value), "{} output type mismatch", name);
            }
        }
    }

    #[tokio::test]
    async fn test_unknown_function_sends_nothing() {
        let (_, contract) = nft();
        let node = Arc::new(StubNode::new());
        let reader = ContractReader::new(Arc::clone(&node));

        let err = reader.read(&contract, "burn", &[json!(1)]).await.unwrap_err();
        assert!(matches!(err, QueryError::InvalidFunction { ref name, .. } if name == "burn"));
        assert_eq!(node.total_requests(), 0);
    }

    #[tokio::test]
    async fn test_state_changing_function_is_rejected() {
        let (_, contract) = nft();
        let node = Arc::new(StubNode::new());
        let reader = ContractReader::new(Arc::clone(&node));

        let err = reader.read(&contract, "mint", &[]).await.unwrap_err();
        assert!(matches!(err, QueryError::InvalidFunction { .. }));
        assert!(err.to_string().contains("payable"));
        assert_eq!(node.total_requests(), 0);
    }

    #[tokio::test]
    async fn test_argument_errors_send_nothing() {
        let (_, contract) = nft();
        let node = Arc::new(StubNode::new());
        let reader = ContractReader::new(Arc::clone(&node));

        let wrong_arity = reader.read(&contract, "ownerOf", &[]).await.unwrap_err();
        assert!(matches!(wrong_arity, QueryError::ArgumentType { .. }));

        let wrong_type = reader
            .read(&contract, "ownerOf", &[json!("not a number")])
            .await
            .unwrap_err();
        assert!(matches!(wrong_type, QueryError::ArgumentType { .. }));

        let bad_address = reader
            .read(&contract, "balanceOf", &[json!("0x1234")])
            .await
            .unwrap_err();
        assert!(matches!(bad_address, QueryError::ArgumentType { .. }));

        let bad_bytes4 = reader
            .read(&contract, "supportsInterface", &[json!("0x01ff")])
            .await
            .unwrap_err();
        assert!(bad_bytes4.is_validation());

        assert_eq!(node.total_requests(), 0);
    }

    #[tokio::test]
    async fn test_custom_error_revert_is_decoded() {
        let (abi, contract) = nft();
        let account = Address::repeat_byte(0x42);
        let error = &abi.error("OwnableUnauthorizedAccount").unwrap()[0];
        let mut data = error.selector().to_vec();
        data.extend_from_slice(&DynSolValue::Address(account).abi_encode());

        let node = Arc::new(StubNode::new().with_call_error(
            &abi,
            "owner",
            NodeError::Revert {
                message: "execution reverted".into(),
                data: Bytes::from(data),
            },
        ));
        let reader = ContractReader::new(node);

        let err = reader.read(&contract, "owner", &[]).await.unwrap_err();
        match err {
            QueryError::ContractRevert { name, args } => {
                assert_eq!(name, "OwnableUnauthorizedAccount");
                assert_eq!(
                    args,
                    RevertArgs::Decoded(vec![DecodedParam::new(
                        "account",
                        DynSolValue::Address(account)
                    )])
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_undecodable_revert_keeps_raw_data() {
        let (abi, contract) = nft();
        let raw = Bytes::from(vec![0xca, 0xfe, 0xba, 0xbe]);
        let node = Arc::new(StubNode::new().with_call_error(
            &abi,
            "ownerOf",
            NodeError::Revert {
                message: "execution reverted".into(),
                data: raw.clone(),
            },
        ));
        let reader = ContractReader::new(node);

        let err = reader.read(&contract, "ownerOf", &[json!(99)]).await.unwrap_err();
        assert!(matches!(
            err,
            QueryError::ContractRevert { ref name, args: RevertArgs::Raw(ref data) }
                if name == "unknown" && *data == raw
        ));
    }

    #[tokio::test]
    async fn test_transport_failure_is_wrapped() {
        let (abi, contract) = nft();
        let node = Arc::new(StubNode::new().with_call_error(
            &abi,
            "totalSupply",
            NodeError::Timeout { ms: 30_000 },
        ));
        let reader = ContractReader::new(node);

        let err = reader.read(&contract, "totalSupply", &[]).await.unwrap_err();
        assert!(matches!(
            err,
            QueryError::Transport(NodeError::Timeout { ms: 30_000 })
        ));
    }

    #[tokio::test]
    async fn test_empty_return_data_is_malformed() {
        let (abi, contract) = nft();
        let node = Arc::new(StubNode::new().with_raw_output(&abi, "ownerOf", Bytes::new()));
        let reader = ContractReader::new(node);

        let err = reader.read(&contract, "ownerOf", &[json!(1)]).await.unwrap_err();
        assert!(matches!(
            err,
            QueryError::Transport(NodeError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_repeated_reads_are_identical() {
        let (abi, contract) = nft();
        let node = Arc::new(StubNode::new().with_output(
            &abi,
            "balanceOf",
            &[DynSolValue::Uint(U256::from(3), 256)],
        ));
        let reader = ContractReader::new(node);
        let args = [json!(owner().to_string())];

        let first = reader.read(&contract, "balanceOf", &args).await.unwrap();
        let second = reader.read(&contract, "balanceOf", &args).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_json()["result"], json!("3"));
    }

    #[tokio::test]
    async fn test_execute_through_trait_object() {
        let (abi, contract) = nft();
        let node: Arc<dyn NodeClient> = Arc::new(StubNode::new().with_output(
            &abi,
            "symbol",
            &[DynSolValue::String("NFT".into())],
        ));
        let reader = ContractReader::new(node);

        let call = FunctionCall::new(contract, "symbol", vec![]);
        let output = reader.execute(&call).await.unwrap();
        assert_eq!(output.to_json()["result"], json!("NFT"));
    }

    #[test]
    fn test_state_changing_overload_at_arity_is_invalid_function() {
        let abi = AbiRegistry::parse_human_readable([
            "function claim(uint256 id) view returns (bool)",
            "function claim(uint256 id, address to)",
        ])
        .unwrap();

        let err = resolve_view_function(&abi, "claim", 2).unwrap_err();
        assert!(matches!(err, QueryError::InvalidFunction { .. }));
        assert!(err.to_string().contains("nonpayable"));

        let err = resolve_view_function(&abi, "claim", 3).unwrap_err();
        assert!(matches!(err, QueryError::ArgumentType { .. }));

        let function = resolve_view_function(&abi, "claim", 1).unwrap();
        assert_eq!(function.signature(), "claim(uint256)");
    }

    #[tokio::test]
    async fn test_overloads_resolve_by_arity() {
        let abi = Arc::new(
            AbiRegistry::parse_human_readable([
                "function balanceOf(address account) view returns (uint256)",
                "function balanceOf(address account, uint256 id) view returns (uint256)",
                "function inspect(uint256 a) view returns (bool)",
                "function inspect(address a) view returns (bool)",
            ])
            .unwrap(),
        );
        let contract = ContractRef::new(NFT, Arc::clone(&abi)).unwrap();
        let two_arg = abi
            .function("balanceOf")
            .unwrap()
            .iter()
            .find(|f| f.inputs.len() == 2)
            .unwrap()
            .clone();
        let node = Arc::new(
            StubNode::new().with_function_output(&two_arg, &[DynSolValue::Uint(U256::from(9), 256)]),
        );
        let reader = ContractReader::new(Arc::clone(&node));

        let output = reader
            .read(&contract, "balanceOf", &[json!(owner().to_string()), json!(7)])
            .await
            .unwrap();
        assert_eq!(output.signature, "balanceOf(address,uint256)");
        assert_eq!(output.value(), Some(&DynSolValue::Uint(U256::from(9), 256)));

        let ambiguous = reader.read(&contract, "inspect", &[json!(1)]).await.unwrap_err();
        assert!(matches!(ambiguous, QueryError::InvalidFunction { .. }));
        assert_eq!(node.call_count(), 1);
    }
}
