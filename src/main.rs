use anyhow::Result;
use clap::Parser;
use escrow_ledger::cli::Cli;
use escrow_ledger::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    cli.run().await
}
