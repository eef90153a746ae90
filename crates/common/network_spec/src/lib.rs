pub mod chain_config;
pub mod cli;

pub use chain_config::{
    ChainConfig, DEV, HOLESKY, HOODI, MAINNET, Network, SEPOLIA, chain_config,
    initialize_test_chain_config, set_chain_config,
};
