use anyhow::{anyhow, Result};
use chain_reader::{
    config::Config,
    error::{QueryError, RevertArgs},
    ethereum::{
        abi::{AbiRegistry, BUILTIN_NAMES},
        params_to_json,
        provider::{AlloyNode, NodeClient, ProviderManager},
        reader::ContractReader,
        scanner::EventScanner,
        utils, ContractRef, FunctionCall, LogQuery,
    },
};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Logs go to stderr so stdout carries only results
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let matches = build_cli().get_matches();

    if let Err(e) = run(&matches).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(matches: &ArgMatches) -> Result<()> {
    // Handle special commands first
    if matches.get_flag("generate-config") {
        println!("{}", Config::generate_sample());
        return Ok(());
    }

    if matches.get_flag("config-path") {
        let path = Config::default_config_path()?;
        println!("{}", path.display());
        return Ok(());
    }

    let Some((command, sub)) = matches.subcommand() else {
        return Err(anyhow!("No command given; see --help"));
    };

    let config_path = matches.get_one::<String>("config").map(|s| s.as_str());
    let mut config = Config::load_or_default(config_path).await;

    if let Some(network) = matches.get_one::<String>("network") {
        let mut available: Vec<String> = config.networks.keys().cloned().collect();
        available.sort();
        utils::validate_network(network, &available)?;
        config.default_network = network.clone();
    }

    if let Some(rpc_url) = matches.get_one::<String>("rpc-url") {
        if let Some(network_config) = config.networks.get_mut(&config.default_network) {
            network_config.rpc_url = rpc_url.clone();
        }
    }

    let contracts = config.contracts.clone();
    let manager = ProviderManager::new(config)?;
    let network = manager.get_network_config(None)?;
    info!("Using network with chain id {}", network.chain_id);
    let node = manager.get_node(None)?;

    match command {
        "nft" => run_nft(node, sub, &contracts.nft).await,
        "call" => run_call(node, sub).await,
        "transfers" => run_transfers(node, sub, &contracts.usdc).await,
        other => Err(anyhow!("Unknown command '{}'", other)),
    }
}

fn build_cli() -> Command {
    Command::new("chain-reader")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Read-only queries against EVM smart contracts")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("Path to configuration file"),
        )
        .arg(
            Arg::new("network")
                .short('n')
                .long("network")
                .value_name("NETWORK")
                .global(true)
                .help("Network to use (ethereum, sepolia, polygon, arbitrum)"),
        )
        .arg(
            Arg::new("rpc-url")
                .short('r')
                .long("rpc-url")
                .value_name("URL")
                .global(true)
                .help("RPC endpoint URL, overriding the network's configured one"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .help("Generate a sample configuration file and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config-path")
                .long("config-path")
                .help("Print the default configuration file path and exit")
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("nft")
                .about("Show the owner and metadata URI of an ERC-721 token")
                .arg(
                    Arg::new("address")
                        .long("address")
                        .value_name("ADDRESS")
                        .help("NFT contract address (defaults to [contracts].nft)"),
                )
                .arg(
                    Arg::new("token-id")
                        .long("token-id")
                        .value_name("ID")
                        .default_value("1")
                        .help("Token ID to look up"),
                ),
        )
        .subcommand(
            Command::new("call")
                .about("Call a view or pure function")
                .arg(
                    Arg::new("address")
                        .long("address")
                        .value_name("ADDRESS")
                        .required(true)
                        .help("Contract address"),
                )
                .arg(
                    Arg::new("function")
                        .short('f')
                        .long("function")
                        .value_name("NAME")
                        .required(true)
                        .help("Function name"),
                )
                .arg(
                    Arg::new("abi")
                        .long("abi")
                        .value_name("FILE")
                        .conflicts_with("builtin")
                        .help("JSON ABI file (bare array or compiler artifact)"),
                )
                .arg(
                    Arg::new("builtin")
                        .long("builtin")
                        .value_name("NAME")
                        .value_parser(BUILTIN_NAMES.to_vec())
                        .default_value("erc721")
                        .help("Built-in ABI to use when --abi is not given"),
                )
                .arg(
                    Arg::new("args")
                        .long("args")
                        .value_name("JSON")
                        .default_value("[]")
                        .help("Arguments as a JSON array, e.g. '[\"0xabc...\", 1]'"),
                ),
        )
        .subcommand(
            Command::new("transfers")
                .about("Summarize recent ERC-20 Transfer events")
                .arg(
                    Arg::new("address")
                        .long("address")
                        .value_name("ADDRESS")
                        .help("Token contract address (defaults to [contracts].usdc)"),
                )
                .arg(
                    Arg::new("blocks")
                        .long("blocks")
                        .value_name("N")
                        .value_parser(value_parser!(u64).range(1..))
                        .default_value("100")
                        .help("Number of most recent blocks to scan"),
                )
                .arg(
                    Arg::new("reverse")
                        .long("reverse")
                        .help("List entries newest first")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("limit")
                        .long("limit")
                        .value_name("N")
                        .value_parser(value_parser!(usize))
                        .help("Maximum number of entries to print"),
                ),
        )
}

async fn run_nft(node: Arc<AlloyNode>, matches: &ArgMatches, default_address: &str) -> Result<()> {
    let address = matches
        .get_one::<String>("address")
        .map(String::as_str)
        .unwrap_or(default_address);
    let token_id = matches
        .get_one::<String>("token-id")
        .cloned()
        .unwrap_or_else(|| "1".to_string());

    let abi = Arc::new(AbiRegistry::builtin("erc721")?);
    let contract = ContractRef::new(address, abi).map_err(report)?;
    let reader = ContractReader::new(node);

    info!("Fetching token {} of {}", token_id, contract.address());
    let args = [Value::String(token_id.clone())];
    let owner = reader
        .read(&contract, "ownerOf", &args)
        .await
        .map_err(report)?;
    let token_uri = reader
        .read(&contract, "tokenURI", &args)
        .await
        .map_err(report)?;

    print_json(&json!({
        "contract": contract.address().to_checksum(None),
        "token_id": token_id,
        "owner": owner.to_json()["result"],
        "token_uri": token_uri.to_json()["result"],
    }))
}

async fn run_call(node: Arc<AlloyNode>, matches: &ArgMatches) -> Result<()> {
    let address = matches
        .get_one::<String>("address")
        .ok_or_else(|| anyhow!("--address is required"))?;
    let function = matches
        .get_one::<String>("function")
        .ok_or_else(|| anyhow!("--function is required"))?;
    let raw_args = matches
        .get_one::<String>("args")
        .map(String::as_str)
        .unwrap_or("[]");
    let args: Vec<Value> = serde_json::from_str(raw_args)
        .map_err(|e| anyhow!("--args must be a JSON array: {}", e))?;

    let mut registry = AbiRegistry::with_builtins()?;
    let abi = match matches.get_one::<String>("abi") {
        Some(path) => registry.load_file("custom", path).await?,
        None => {
            let name = matches
                .get_one::<String>("builtin")
                .map(String::as_str)
                .unwrap_or("erc721");
            registry.get(name)?
        }
    };

    let contract = ContractRef::new(address, abi).map_err(report)?;
    let call = FunctionCall::new(contract, function.as_str(), args);
    let output = ContractReader::new(node)
        .execute(&call)
        .await
        .map_err(report)?;

    print_json(&output.to_json())
}

async fn run_transfers(
    node: Arc<AlloyNode>,
    matches: &ArgMatches,
    default_address: &str,
) -> Result<()> {
    let address = matches
        .get_one::<String>("address")
        .map(String::as_str)
        .unwrap_or(default_address);
    let blocks = matches.get_one::<u64>("blocks").copied().unwrap_or(100);
    let newest_first = matches.get_flag("reverse");
    let limit = matches.get_one::<usize>("limit").copied();

    let abi = Arc::new(AbiRegistry::builtin("erc20")?);
    let contract = ContractRef::new(address, abi).map_err(report)?;

    let head = node
        .block_number()
        .await
        .map_err(|e| report(QueryError::Transport(e)))?;
    let from_block = head.saturating_sub(blocks - 1);

    let query = LogQuery::new(contract, "Transfer", from_block, head);
    let summary = EventScanner::new(node).scan(&query).await.map_err(report)?;

    if !summary.has_activity() {
        info!("No Transfer events in blocks {}..={}", from_block, head);
    }
    print_json(&summary.to_json(newest_first, limit))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Turns a query failure into a user-facing error, adding a hint for node
/// failures and the decoded arguments for reverts.
fn report(err: QueryError) -> anyhow::Error {
    let detail = match &err {
        QueryError::Transport(cause) | QueryError::Scan { cause, .. } => {
            Some(utils::interpret_rpc_error(&cause.to_string()))
        }
        QueryError::ContractRevert { args, .. } => Some(match args {
            RevertArgs::Decoded(params) => params_to_json(params).to_string(),
            RevertArgs::Raw(data) => format!("0x{}", hex::encode(data)),
        }),
        _ => None,
    };

    match detail {
        Some(detail) => anyhow!("{}: {}", err, detail),
        None => anyhow::Error::new(err),
    }
}
