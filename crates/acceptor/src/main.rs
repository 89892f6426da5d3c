//! chanwall 命令行入口

use chanwall_acceptor::ContextBuilder;
use chanwall_acceptor::cli::{Cli, CommandRunner, Commands};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let runner = CommandRunner::new(ContextBuilder::new());

    match cli.command {
        Commands::Check { file, json } => {
            runner.run_check(&file, json)?;
        }
        Commands::Run { config_dir } => {
            runner.run_service(&config_dir).await?;
        }
    }

    Ok(())
}
