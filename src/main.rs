use clap::Parser;
use std::error::Error;
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod dates;
mod earnings;
mod error;
mod fx;
mod grouping;
mod hierarchy;
mod ledger;
mod models;
mod rollups;
mod storage;
mod visibility;

use app::App;
use cli::Cli;
use storage::Settings;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "freelance_ledger=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::resolve(storage::read_config(), cli.data)?;
    tracing::debug!(path = %settings.data_file.display(), "Using store");

    let mut app = App::load(settings, cli.user)?;
    app.run(cli.command)
}
