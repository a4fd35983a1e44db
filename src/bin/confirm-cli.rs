//! Client for the agent-confirm service.
//!
//! Keeps the pending-operation ledger on local disk and drives confirmations
//! over HTTP, resuming anything a previous run left behind.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, TxHash};
use clap::{Parser, Subcommand};

use agent_confirm::blockchain::{AlloyRpcReader, ChainId, NetworkRegistry};
use agent_confirm::config::{load_config, ServiceConfig};
use agent_confirm::confirmation::{CoordinatorSettings, EntityId, OperationType};
use agent_confirm::ledger::{
    recover_pending, ConfirmationFlow, HttpTransport, PendingLedger, PendingRecord, TaskStatus,
};
use agent_confirm::observability::logging;

#[derive(Parser)]
#[command(name = "confirm-cli")]
#[command(about = "Confirm on-chain operations and resume interrupted ones", long_about = None)]
struct Cli {
    /// Config file; the [client], [ledger], [confirmation], [retries] and
    /// [[networks]] sections are used.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Service base URL (overrides [client] server_url).
    #[arg(short, long)]
    url: Option<String>,

    /// Wallet address to act as (overrides [client] wallet_address).
    #[arg(short, long)]
    wallet: Option<String>,

    /// Ledger file (overrides [ledger] path).
    #[arg(short, long)]
    ledger: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a broadcast transaction and confirm it
    Submit {
        #[arg(long)]
        agent: String,
        #[arg(long)]
        operation: OperationType,
        #[arg(long)]
        tx: TxHash,
        #[arg(long)]
        chain: u64,
        /// Identifier the transaction is expected to produce
        #[arg(long)]
        result_id: Option<u64>,
    },
    /// Resume every pending operation
    Resume,
    /// List pending operations
    Pending,
    /// Forget the pending record for an operation
    Clear {
        #[arg(long)]
        operation: OperationType,
    },
    /// Show the service's confirmation state
    Status {
        #[arg(long)]
        agent: String,
        #[arg(long)]
        operation: OperationType,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };
    logging::init_logging(&config.observability);

    let ledger_path = cli
        .ledger
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.ledger.path));
    let ledger = Arc::new(PendingLedger::open(
        &ledger_path,
        Duration::from_secs(config.ledger.retention_secs),
    )?);

    match cli.command {
        Commands::Pending => {
            let records = ledger.get_all_pending()?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Commands::Clear { operation } => {
            ledger.clear_pending(operation)?;
            println!("Cleared pending {}", operation);
        }
        Commands::Status { ref agent, operation } => {
            let transport = transport(&cli, &config)?;
            let state = transport.state(&EntityId::new(agent.as_str()), operation).await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Commands::Resume => {
            let flow = flow(&cli, &config, ledger)?;
            let reports = recover_pending(&flow).await?;
            if reports.is_empty() {
                println!("Nothing to resume");
            }
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        Commands::Submit {
            ref agent,
            operation,
            tx,
            chain,
            result_id,
        } => {
            let flow = Arc::new(flow(&cli, &config, ledger)?);
            let record = PendingRecord::new(operation, EntityId::new(agent.as_str()), tx, ChainId(chain))
                .with_claimed_result_id(result_id);

            let task = flow.submitted(record)?;
            let mut status = task.subscribe();
            let printer = tokio::spawn(async move {
                loop {
                    println!("{}", describe(&status.borrow_and_update()));
                    if status.changed().await.is_err() {
                        break;
                    }
                }
            });

            let result = task.join().await;
            let _ = printer.await;
            let outcome = result?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    }

    Ok(())
}

fn transport(cli: &Cli, config: &ServiceConfig) -> Result<HttpTransport, Box<dyn std::error::Error>> {
    let url: url::Url = cli.url.as_deref().unwrap_or(&config.client.server_url).parse()?;
    let wallet: Address = cli
        .wallet
        .as_deref()
        .or(config.client.wallet_address.as_deref())
        .ok_or("a wallet address is required (--wallet or [client] wallet_address)")?
        .parse()?;

    // Give the server room to finish its own bounded wait.
    let timeout = Duration::from_secs(config.timeouts.request_secs + 10);
    Ok(HttpTransport::new(url, wallet, timeout)?)
}

fn flow(
    cli: &Cli,
    config: &ServiceConfig,
    ledger: Arc<PendingLedger>,
) -> Result<ConfirmationFlow, Box<dyn std::error::Error>> {
    let transport = Arc::new(transport(cli, config)?);
    let flow = ConfirmationFlow::new(ledger, transport, CoordinatorSettings::from(config));

    if config.networks.is_empty() {
        return Ok(flow);
    }
    let networks = Arc::new(NetworkRegistry::from_configs(config.networks.clone()));
    let reader = AlloyRpcReader::new(
        networks.clone(),
        Duration::from_secs(config.confirmation.rpc_timeout_secs),
    );
    Ok(flow.with_reader(Arc::new(reader), networks))
}

fn describe(status: &TaskStatus) -> String {
    match status {
        TaskStatus::Idle => "idle".to_string(),
        TaskStatus::Processing => "processing...".to_string(),
        TaskStatus::Success => "success".to_string(),
        TaskStatus::Error(message) => format!("error: {}", message),
    }
}
