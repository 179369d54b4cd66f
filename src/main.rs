use anyhow::Result;
use clap::Parser;

use mailfeed::{cli, cli::Args, config::Config, logging};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.account.as_deref());

    let config = Config::load_from_file(args.config.clone());

    cli::run(&args, &config).await
}
