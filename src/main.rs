use clap::Parser;
use tracing::{error, info};
use vizdiff::{load_config, setup_logging, Cli, CliRunner, EXIT_TOOL_FAILURE};

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    setup_logging(args.verbose);

    info!("Starting vizdiff v{}", env!("CARGO_PKG_VERSION"));

    let code = match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("vizdiff failed: {e:#}");
            EXIT_TOOL_FAILURE
        }
    };

    std::process::exit(code);
}

async fn run(args: Cli) -> anyhow::Result<i32> {
    let config = load_config(&args).await?;
    let runner = CliRunner::new(config);
    Ok(runner.run(args.command).await?)
}
