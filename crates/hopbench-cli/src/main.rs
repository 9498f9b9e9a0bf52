//! hopbench - 2-hop aggregation benchmark driver.

mod args;
mod commands;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use args::{Cli, Command};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hopbench=info,hopbench_core=info,hopbench_backends=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = cli.options.into_config();
    tracing::debug!(
        data_dir = %config.data_dir.display(),
        results_dir = %config.results_dir.display(),
        backends = ?config.backends,
        "configuration loaded"
    );

    match cli.command {
        Command::Generate => commands::generate_data(&config),
        Command::Setup => commands::setup(&config),
        Command::Run => commands::run(&config),
        Command::Pipeline {
            skip_generate,
            skip_setup,
        } => commands::pipeline(&config, skip_generate, skip_setup),
    }
}
