pub mod verbosity;

use std::{path::PathBuf, sync::Arc};

use clap::{Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use vista_consensus_misc::ForkName;
use vista_network_spec::{ChainConfig, cli::chain_config_parser};

use crate::cli::verbosity::verbosity_parser;

const DEFAULT_NETWORK: &str = "mainnet";

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, default_value = "3", value_parser = verbosity_parser)]
    pub verbosity: LevelFilter,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the header fields, finality and registry summary of a state
    #[command(name = "inspect")]
    Inspect(InspectConfig),

    /// Produce Merkle proofs against the state root
    #[command(name = "proof")]
    Proof(ProofConfig),

    /// Advance a state through empty slots
    #[command(name = "process-slots")]
    ProcessSlots(ProcessSlotsConfig),

    /// Build or extend a persisted validator pubkey index
    #[command(name = "pubkeys")]
    Pubkeys(PubkeysConfig),
}

#[derive(Debug, Args)]
pub struct StateArgs {
    #[arg(help = "Path of the SSZ-encoded beacon state")]
    pub state: PathBuf,

    #[arg(
        long,
        env = "VISTA_NETWORK",
        help = "Choose mainnet, holesky, sepolia, hoodi, dev or provide a path to a YAML config file",
        default_value = DEFAULT_NETWORK,
        value_parser = chain_config_parser
    )]
    pub network: Arc<ChainConfig>,

    #[arg(long, help = "Fork of the state; inferred from its slot when omitted")]
    pub fork: Option<ForkName>,
}

#[derive(Debug, Args)]
pub struct InspectConfig {
    #[command(flatten)]
    pub state: StateArgs,

    #[arg(long, help = "Also print the proposers of the current epoch")]
    pub proposers: bool,
}

#[derive(Debug, Args)]
pub struct ProofConfig {
    #[command(flatten)]
    pub state: StateArgs,

    #[arg(
        long = "gindex",
        required_unless_present = "finalized",
        help = "Generalized index to prove; repeat for a multiproof"
    )]
    pub gindices: Vec<u64>,

    #[arg(long, help = "Prove the finalized checkpoint root", conflicts_with = "gindices")]
    pub finalized: bool,
}

#[derive(Debug, Args)]
pub struct ProcessSlotsConfig {
    #[command(flatten)]
    pub state: StateArgs,

    #[arg(long, help = "Slot to advance to")]
    pub slot: u64,

    #[arg(long, short, help = "Write the advanced state here")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct PubkeysConfig {
    #[command(flatten)]
    pub state: StateArgs,

    #[arg(long, short, help = "Pubkey index file; extended in place when it exists")]
    pub output: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_inspect_command() {
        let cli = Cli::parse_from([
            "vista",
            "inspect",
            "state.ssz",
            "--network",
            "dev",
            "--fork",
            "electra",
            "--verbosity",
            "4",
        ]);

        assert_eq!(cli.verbosity, LevelFilter::DEBUG);
        match cli.command {
            Commands::Inspect(config) => {
                assert_eq!(config.state.state, PathBuf::from("state.ssz"));
                assert_eq!(config.state.fork, Some(ForkName::Electra));
                assert!(!config.proposers);
            }
            command => panic!("unexpected command {command:?}"),
        }
    }

    #[test]
    fn test_cli_proof_arguments() {
        let cli = Cli::parse_from(["vista", "proof", "state.ssz", "--gindex", "34", "--gindex", "105"]);
        match cli.command {
            Commands::Proof(config) => assert_eq!(config.gindices, vec![34, 105]),
            command => panic!("unexpected command {command:?}"),
        }

        assert!(Cli::try_parse_from(["vista", "proof", "state.ssz"]).is_err());
        assert!(
            Cli::try_parse_from(["vista", "proof", "state.ssz", "--finalized", "--gindex", "3"])
                .is_err()
        );
    }

    #[test]
    fn test_verbosity_bounds() {
        assert!(Cli::try_parse_from(["vista", "inspect", "s", "--verbosity", "6"]).is_err());
        assert!(
            Cli::try_parse_from(["vista", "process-slots", "s", "--slot", "9", "-v", "1"]).is_ok()
        );
    }
}
