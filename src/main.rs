//! Chrono-Capsule command line client.
//!
//! ```text
//! chrono-capsule [--config FILE] [--account ADDR] <command>
//!
//!   status     connection, head and contract
//!   accounts   granted accounts and balances
//!   list       capsules of the selected account
//!   create     lock a message until a future block
//!   open       reveal an unlocked capsule
//!   watch      keep the dashboard live until Ctrl-C
//! ```
//!
//! Signing keys come from the environment variable named in
//! `wallet.keys_env_var` (default `CHRONO_CAPSULE_KEYS`).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use clap::{Parser, Subcommand};

use chrono_capsule::capsule::{
    CapsuleDraft, CapsuleOpener, CapsuleQueryService, CreateCapsuleForm, DashboardView,
    FetchOutcome,
};
use chrono_capsule::config::load_or_default;
use chrono_capsule::context::AppContext;
use chrono_capsule::lifecycle::{signals::wait_for_signal, Shutdown};
use chrono_capsule::observability::{logging, metrics};
use chrono_capsule::wallet::{EnvKeySource, KeySource};

#[derive(Parser)]
#[command(name = "chrono-capsule")]
#[command(about = "Lock messages on-chain until a future block", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the JSON-RPC endpoint
    #[arg(long)]
    rpc_url: Option<String>,

    /// Override the contract address
    #[arg(long)]
    contract: Option<String>,

    /// Select this account instead of the first one granted
    #[arg(short, long)]
    account: Option<String>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show connection status and current head
    Status,
    /// List granted accounts and their balances
    Accounts,
    /// List capsules you created or receive
    List,
    /// Create a capsule
    Create {
        /// Recipient address
        #[arg(long)]
        to: String,
        /// Message to lock
        #[arg(long)]
        message: String,
        /// Lock duration in blocks
        #[arg(long)]
        blocks: String,
        /// Value to lock, in whole tokens
        #[arg(long, default_value = "")]
        value: String,
    },
    /// Open an unlocked capsule addressed to you
    Open {
        /// Capsule id
        id: u64,
    },
    /// Keep the dashboard live until interrupted
    Watch {
        /// Refresh on every new block, not only on account changes
        #[arg(long)]
        every_block: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_or_default(cli.config.as_deref())?;
    if let Some(url) = cli.rpc_url.clone() {
        config.chain.rpc_url = url;
    }
    if let Some(contract) = cli.contract.clone() {
        config.chain.contract_address = contract;
    }

    logging::init_logging(&config.observability);
    tracing::info!("chrono-capsule v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let connect_limit = Duration::from_secs(config.chain.rpc_timeout_secs);
    let source: Arc<dyn KeySource> = Arc::new(EnvKeySource::new(config.wallet.keys_env_var.clone()));
    let ctx = Arc::new(AppContext::start(config, source));

    if ctx.connection().ready(connect_limit).await.is_none() {
        if matches!(cli.command, Commands::Status) {
            println!("Chain: not connected ({})", ctx.config().chain.rpc_url);
            return Ok(());
        }
        return Err(format!("Could not connect to {}", ctx.config().chain.rpc_url).into());
    }
    ctx.connection().wait_for_block(1, connect_limit).await;

    if let Commands::Status = cli.command {
        print_status(&ctx, cli.json)?;
        return Ok(());
    }

    ctx.accounts().connect().await?;
    if let Some(account) = &cli.account {
        let address: Address = account.parse()?;
        ctx.accounts().select_account(address)?;
    }

    let queries = CapsuleQueryService::new();

    match cli.command {
        Commands::Status => {}
        Commands::Accounts => {
            let mut balance = ctx.accounts().subscribe_balance();
            let _ = tokio::time::timeout(connect_limit, balance.wait_for(Option::is_some)).await;
            print_accounts(&ctx, cli.json)?;
        }
        Commands::List => {
            report_fetch(queries.fetch_capsules(&ctx).await);
            print_dashboard(&ctx, &queries, cli.json)?;
        }
        Commands::Create {
            to,
            message,
            blocks,
            value,
        } => {
            let form = CreateCapsuleForm::new();
            let printer = tokio::spawn(print_status_lines(form.subscribe_status()));
            let draft = CapsuleDraft {
                recipient: to,
                message,
                duration: blocks,
                value,
            };
            let created = form.submit(&ctx, &queries, &draft).await;
            printer.abort();
            match created? {
                Some(id) => println!("Capsule created successfully! (id {})", id),
                None => println!("Capsule created successfully!"),
            }
        }
        Commands::Open { id } => {
            report_fetch(queries.fetch_capsules(&ctx).await);
            let capsule = queries
                .capsules()
                .iter()
                .find(|capsule| capsule.id == id)
                .cloned()
                .ok_or_else(|| format!("Capsule #{} not found for the selected account", id))?;

            let opener = CapsuleOpener::new();
            let message = opener.open(&ctx, &queries, &capsule).await?;
            println!("{}", opener.status());
            println!("Message: {}", message);
        }
        Commands::Watch { every_block } => {
            watch_dashboard(Arc::clone(&ctx), queries, every_block, cli.json).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn report_fetch(outcome: FetchOutcome) {
    match outcome {
        FetchOutcome::Aborted(e) => eprintln!("Error fetching capsules: {}", e),
        FetchOutcome::Completed { skipped, .. } if skipped > 0 => {
            eprintln!("{} capsule(s) could not be loaded and were skipped", skipped)
        }
        _ => {}
    }
}

fn print_status(ctx: &AppContext, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let chain = &ctx.config().chain;
    if json {
        let status = serde_json::json!({
            "connected": ctx.connection().is_ready(),
            "rpc_url": chain.rpc_url,
            "chain_id": chain.chain_id,
            "contract": chain.contract_address,
            "block": ctx.current_block(),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("Chain: connected ({})", chain.rpc_url);
        println!("Chain ID: {}", chain.chain_id);
        println!("Contract: {}", chain.contract_address);
        println!("Block: #{}", ctx.current_block());
    }
    Ok(())
}

fn print_accounts(ctx: &AppContext, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let selected = ctx.accounts().selected_address();
    let balance = ctx
        .accounts()
        .balance()
        .map(|b| chrono_capsule::capsule::view::format_value(b, ctx.decimals()));

    if json {
        let accounts: Vec<_> = ctx
            .accounts()
            .accounts()
            .iter()
            .map(|account| {
                serde_json::json!({
                    "name": account.name(),
                    "address": account.address(),
                    "selected": Some(account.address()) == selected,
                })
            })
            .collect();
        let out = serde_json::json!({ "accounts": accounts, "balance": balance });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for account in ctx.accounts().accounts().iter() {
        let marker = if Some(account.address()) == selected { "*" } else { " " };
        println!("{} {}", marker, account.label());
    }
    if let Some(balance) = balance {
        println!("Balance: {}", balance);
    }
    Ok(())
}

fn print_dashboard(
    ctx: &AppContext,
    queries: &CapsuleQueryService,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let view = DashboardView::build(ctx, queries);
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        println!("{}", view);
    }
    Ok(())
}

async fn print_status_lines(mut status: tokio::sync::watch::Receiver<String>) {
    while status.changed().await.is_ok() {
        let line = status.borrow_and_update().clone();
        if !line.is_empty() {
            println!("{}", line);
        }
    }
}

async fn watch_dashboard(
    ctx: Arc<AppContext>,
    queries: CapsuleQueryService,
    every_block: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = Shutdown::new();
    let mut events = queries.subscribe();

    let follower = {
        let queries = queries.clone();
        let ctx = Arc::clone(&ctx);
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move { queries.follow(ctx, every_block, shutdown_rx).await })
    };

    let signal = wait_for_signal();
    tokio::pin!(signal);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(outcome) => {
                    report_fetch(outcome);
                    print_dashboard(&ctx, &queries, json)?;
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "Dashboard fell behind fetch events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            _ = &mut signal => break,
        }
    }

    shutdown.trigger();
    let _ = follower.await;
    Ok(())
}
