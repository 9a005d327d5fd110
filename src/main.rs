use anyhow::Result;
use clap::Parser;
use jobscribe::app::{
    init_logging, load_config, run_capabilities, run_config, run_fetch, run_transcribe,
};
use jobscribe::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Transcribe(args) => run_transcribe(config, args, cli.quiet).await?,
        Commands::Fetch(args) => run_fetch(&config, args).await?,
        Commands::Capabilities => run_capabilities(&config).await?,
        Commands::Config => run_config(&config)?,
    }

    Ok(())
}
