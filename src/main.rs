use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use custard_backfill::cli::status;
use custard_backfill::database_ops::backfill::{run_backfill, BackfillOptions};
use custard_backfill::database_ops::custard::provider::CustardProvider;
use custard_backfill::database_ops::discover::{run_discover, DiscoverOptions};
use custard_backfill::database_ops::layout::DataLayout;
use custard_backfill::database_ops::segments::Segment;
use custard_backfill::logging::init_tracing;
use custard_backfill::util::env as env_util;
use tracing::error;

#[derive(Parser, Debug)]
#[command(
    name = "custard-backfill",
    version,
    about = "Staged flavor backfill with checkpoints"
)]
struct Cli {
    /// Dataset directory (falls back to CUSTARD_DATA_DIR, then data/backfill)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Remote API base URL (falls back to CUSTARD_API_BASE)
    #[arg(long, global = true)]
    api_base: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover stores and split them into primary/remainder lists
    Discover(DiscoverArgs),
    /// Backfill store flavor calendars for one segment
    Backfill(BackfillArgs),
    /// Show discovery/backfill checkpoint status
    Status,
}

#[derive(Debug, Args)]
struct ThrottleArgs {
    /// Optional sleep between API calls
    #[arg(long, default_value_t = 0)]
    sleep_ms: u64,
    /// HTTP timeout seconds (falls back to CUSTARD_HTTP_TIMEOUT_SECS, then 30)
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Debug, Args)]
struct DiscoverArgs {
    /// Discovery tokens to process per run
    #[arg(long, default_value_t = 200)]
    tokens_per_run: usize,
    #[command(flatten)]
    throttle: ThrottleArgs,
}

#[derive(Debug, Args)]
struct BackfillArgs {
    /// Store segment
    #[arg(long, value_enum)]
    segment: SegmentArg,
    /// Stores to process per run
    #[arg(long, default_value_t = 50)]
    stores_per_run: usize,
    /// Stop immediately on first fetch error
    #[arg(long = "stop-on-error", action = ArgAction::SetTrue)]
    stop_on_error: bool,
    #[command(flatten)]
    throttle: ThrottleArgs,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum SegmentArg {
    #[value(alias = "wi")]
    Primary,
    #[value(alias = "rest")]
    Remainder,
}

impl From<SegmentArg> for Segment {
    fn from(arg: SegmentArg) -> Self {
        match arg {
            SegmentArg::Primary => Segment::Primary,
            SegmentArg::Remainder => Segment::Remainder,
        }
    }
}

fn timeout(args: &ThrottleArgs) -> Duration {
    Duration::from_secs(env_util::timeout_secs(args.timeout))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_util::init_env();
    if let Err(e) = init_tracing("info") {
        eprintln!("{e}");
    }

    match run(Cli::parse()).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!(error = ?err, "run aborted");
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let layout = DataLayout::new(env_util::data_dir(cli.data_dir));
    let api_base = env_util::api_base(cli.api_base.as_deref());
    env_util::bootstrap_cli("custard-backfill", &api_base, layout.root());

    match cli.command {
        Command::Discover(args) => {
            let source = CustardProvider::new(&api_base)?;
            let opts = DiscoverOptions {
                tokens_per_run: args.tokens_per_run,
                sleep_ms: args.throttle.sleep_ms,
                timeout: timeout(&args.throttle),
            };
            let summary = run_discover(&source, &layout, &opts).await?;
            println!("discover {}", serde_json::to_string(&summary)?);
            Ok(0)
        }
        Command::Backfill(args) => {
            let source = CustardProvider::new(&api_base)?;
            let opts = BackfillOptions {
                segment: args.segment.into(),
                stores_per_run: args.stores_per_run,
                sleep_ms: args.throttle.sleep_ms,
                timeout: timeout(&args.throttle),
                stop_on_error: args.stop_on_error,
            };
            let summary = run_backfill(&source, &layout, &opts)
                .await
                .with_context(|| format!("backfill {} failed", opts.segment))?;
            println!("backfill {}", serde_json::to_string(&summary)?);
            Ok(summary.exit_code())
        }
        Command::Status => {
            status::run(&layout)?;
            Ok(0)
        }
    }
}
