mod config;
mod server;

use std::sync::Arc;
use std::time::{Duration, Instant};

use bc_data::{BiggestChange, RpcClient, RpsLimiter};
use bc_engine::Aggregator;
use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, Context, Result};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use config::{listen_address, EngineArgs, UpstreamArgs};
use indicatif::{ProgressBar, ProgressStyle};
use server::AppState;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "biggest-change")]
#[command(about = "Finds the Ethereum address whose balance changed most over recent blocks")]
#[command(version)]
struct Cli {
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Log filter used when RUST_LOG is unset, e.g. `debug` or `bc_data=trace`.
    #[arg(long, env = "LOG_LEVEL", global = true)]
    log_level: Option<String>,

    #[command(flatten)]
    upstream: UpstreamArgs,

    #[command(flatten)]
    engine: EngineArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the REST and JSON-RPC endpoints.
    Serve(ServeArgs),
    /// Run one computation and print the result.
    Query(QueryArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Listen address, or a bare port to bind every interface.
    #[arg(long, env = "HTTP_PORT", default_value = "0.0.0.0:8080")]
    addr: String,

    /// Deadline for one request's computation.
    #[arg(long, env = "HTTP_TIMEOUT_MS", default_value_t = 5_000)]
    request_timeout_ms: u64,
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// Number of most recent blocks. Zero uses --default-blocks.
    #[arg(long, default_value_t = 0)]
    blocks: u64,

    /// Output format: table (default) or json.
    #[arg(long, default_value = "table")]
    output: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet, cli.log_level.as_deref())?;

    let aggregator = build_aggregator(&cli.upstream, &cli.engine)?;

    match cli.command {
        Commands::Serve(args) => handle_serve(aggregator, args).await,
        Commands::Query(args) => handle_query(aggregator, args).await,
    }
}

fn init_tracing(verbose: u8, quiet: bool, log_level: Option<&str>) -> Result<()> {
    let level = if quiet {
        Level::WARN
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    let fallback = log_level.unwrap_or(level.as_str());

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .wrap_err("failed to initialize tracing filter")?;

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn build_aggregator(upstream: &UpstreamArgs, engine: &EngineArgs) -> Result<Arc<Aggregator>> {
    let rpc_url = upstream.rpc_url()?;
    let limiter = Arc::new(RpsLimiter::new(upstream.limiter_config()));
    let client = RpcClient::new(rpc_url, limiter, upstream.rpc_config())
        .wrap_err("failed to create RPC client")?;
    let config = engine.engine_config()?;

    info!(
        rpc_url = %client.url(),
        rps = upstream.rps,
        max_workers = config.max_workers,
        cache_size = config.cache_size,
        default_blocks = config.default_window,
        "engine configured"
    );

    Ok(Arc::new(Aggregator::new(Arc::new(client), config)))
}

async fn handle_serve(aggregator: Arc<Aggregator>, args: ServeArgs) -> Result<()> {
    let addr = listen_address(&args.addr)?;
    let listener = TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("failed to bind {addr}"))?;

    let state = AppState::new(aggregator, Duration::from_millis(args.request_timeout_ms));
    server::serve(listener, state).await
}

async fn handle_query(aggregator: Arc<Aggregator>, args: QueryArgs) -> Result<()> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .wrap_err("failed to create progress style")?,
    );
    pb.set_message("aggregating block deltas");
    pb.enable_steady_tick(Duration::from_millis(100));

    let started = Instant::now();
    let outcome = aggregator.compute(args.blocks, &cancel).await;
    pb.finish_and_clear();
    let change = outcome.wrap_err("failed to compute biggest change")?;

    match args.output.to_lowercase().as_str() {
        "table" => println!("{}", render_table(&change, started.elapsed())),
        "json" => {
            let json =
                serde_json::to_string_pretty(&change).wrap_err("failed to serialize result")?;
            println!("{json}");
        }
        other => return Err(eyre!("unknown output format {other:?}: expected table or json")),
    }

    let stats = aggregator.cache().stats();
    info!(
        window = change.window_size,
        last_block = %change.last_block,
        cache_hits = stats.hits,
        cache_misses = stats.misses,
        "query command completed"
    );
    Ok(())
}

fn render_table(change: &BiggestChange, elapsed: Duration) -> Table {
    let direction = if change.address.is_empty() {
        "-"
    } else if change.is_positive {
        "inflow"
    } else {
        "outflow"
    };
    let address = if change.address.is_empty() {
        "(none)"
    } else {
        change.address.as_str()
    };

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Address".to_string(), address.to_string()]);
    table.add_row(vec!["Net change (wei)".to_string(), change.amount.clone()]);
    table.add_row(vec!["Direction".to_string(), direction.to_string()]);
    table.add_row(vec!["Last block".to_string(), change.last_block.clone()]);
    table.add_row(vec!["Blocks".to_string(), change.window_size.to_string()]);
    table.add_row(vec![
        "Elapsed".to_string(),
        format!("{:.2}s", elapsed.as_secs_f64()),
    ]);
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subcommands_parse() {
        let cli = Cli::try_parse_from([
            "biggest-change",
            "--rpc-url",
            "http://localhost:8545",
            "query",
            "--blocks",
            "5",
            "--output",
            "json",
        ])
        .expect("query parses");
        match cli.command {
            Commands::Query(args) => {
                assert_eq!(args.blocks, 5);
                assert_eq!(args.output, "json");
            }
            other => panic!("unexpected command {other:?}"),
        }

        // globals are accepted after the subcommand too
        let cli = Cli::try_parse_from([
            "biggest-change",
            "serve",
            "--addr",
            "9000",
            "--max-workers",
            "8",
            "-v",
        ])
        .expect("serve parses");
        assert_eq!(cli.engine.max_workers, 8);
        assert_eq!(cli.verbose, 1);
        assert!(matches!(cli.command, Commands::Serve(ref args) if args.addr == "9000"));
    }

    #[test]
    fn table_marks_direction() {
        let change = BiggestChange {
            address: "0x1".into(),
            amount: "0x258".into(),
            last_block: "0xc8".into(),
            window_size: 1,
            is_positive: false,
        };
        let rendered = render_table(&change, Duration::from_millis(1500)).to_string();
        assert!(rendered.contains("outflow"));
        assert!(rendered.contains("0x258"));

        let empty = BiggestChange {
            address: String::new(),
            amount: "0x0".into(),
            last_block: "0x0".into(),
            window_size: 0,
            is_positive: false,
        };
        assert!(render_table(&empty, Duration::ZERO).to_string().contains("(none)"));
    }
}
