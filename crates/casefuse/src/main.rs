mod cli;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    dispatch(cli.command, cli.config.as_deref()).await
}

async fn dispatch(command: Commands, config: Option<&std::path::Path>) -> Result<()> {
    match command {
        Commands::Extract { file, mode } => cli::extract::run(config, &file, mode).await,
        Commands::Fuse {
            markup,
            scan,
            document,
            label,
            record_type,
            catalog,
            trace,
        } => {
            let inputs = cli::fuse::Inputs {
                markup,
                scan,
                document,
                label,
                record_type,
                catalog,
                trace,
            };
            cli::fuse::run(config, inputs).await
        }
        Commands::Config => cli::config::run(config),
    }
}
