//! disque-router - command-line client for Disque clusters
//!
//! Routes each command to the node owning the job IDs it mentions, using
//! the same topology discovery as the library.

use anyhow::Result;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

use disque_router::cli_mode;
use disque_router::config::CliArgs;
use disque_router::DisqueRouter;

fn setup_logging(verbose: bool, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

async fn run(args: CliArgs) -> Result<()> {
    let config = args
        .to_router_config()
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let router = DisqueRouter::new(config)?;

    let result = if args.nodes {
        cli_mode::run_nodes(&router).await
    } else if !args.command_args.is_empty() {
        cli_mode::run_command(&router, &args.command_args).await
    } else {
        cli_mode::run_repl(&router).await
    };

    router.quit().await;
    result
}

fn main() {
    let args = CliArgs::parse_args();
    setup_logging(args.verbose, args.quiet);

    if let Err(e) = args.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(2);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(args)) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}
