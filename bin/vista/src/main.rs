use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vista::{
    cli::{Cli, Commands},
    commands::{run_inspect, run_process_slots, run_proof, run_pubkeys},
};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG directives take precedence over --verbosity.
    let env_filter = EnvFilter::builder()
        .with_default_directive(cli.verbosity.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
    info!("vista {}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Inspect(config) => run_inspect(config),
        Commands::Proof(config) => run_proof(config),
        Commands::ProcessSlots(config) => run_process_slots(config),
        Commands::Pubkeys(config) => run_pubkeys(config),
    }
}
