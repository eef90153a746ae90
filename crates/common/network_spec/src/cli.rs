use std::{fs, sync::Arc};

use crate::chain_config::{ChainConfig, DEV, HOLESKY, HOODI, MAINNET, SEPOLIA};

/// Resolve `--network`: a known network name or the path of a config YAML file.
pub fn chain_config_parser(network_string: &str) -> Result<Arc<ChainConfig>, String> {
    match network_string {
        "mainnet" => Ok(MAINNET.clone()),
        "holesky" => Ok(HOLESKY.clone()),
        "sepolia" => Ok(SEPOLIA.clone()),
        "hoodi" => Ok(HOODI.clone()),
        "dev" => Ok(DEV.clone()),
        path => read_chain_config(path),
    }
}

fn read_chain_config(path: &str) -> Result<Arc<ChainConfig>, String> {
    let contents = fs::read_to_string(path).map_err(|err| format!("Failed to read file: {err}"))?;
    Ok(Arc::new(serde_yaml::from_str(&contents).map_err(
        |err| format!("Failed to parse YAML from: {err}"),
    )?))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use alloy_primitives::fixed_bytes;
    use vista_consensus_misc::constants::FAR_FUTURE_EPOCH;

    use super::*;
    use crate::chain_config::Network;

    const CONFIG: &str = r#"
PRESET_BASE: 'mainnet'
CONFIG_NAME: 'kurtosis'
MIN_GENESIS_TIME: 1700000000
GENESIS_FORK_VERSION: '0x10000038'
GENESIS_DELAY: 60
ALTAIR_FORK_VERSION: '0x20000038'
ALTAIR_FORK_EPOCH: 0
BELLATRIX_FORK_VERSION: '0x30000038'
BELLATRIX_FORK_EPOCH: 0
CAPELLA_FORK_VERSION: '0x40000038'
CAPELLA_FORK_EPOCH: 0
DENEB_FORK_VERSION: '0x50000038'
DENEB_FORK_EPOCH: 0
ELECTRA_FORK_VERSION: '0x60000038'
ELECTRA_FORK_EPOCH: 10
SECONDS_PER_SLOT: 12
MIN_VALIDATOR_WITHDRAWABILITY_DELAY: 256
SHARD_COMMITTEE_PERIOD: 256
EJECTION_BALANCE: 16000000000
"#;

    #[test]
    fn test_known_networks() {
        assert_eq!(chain_config_parser("hoodi").unwrap().network, Network::Hoodi);
        assert!(chain_config_parser("/does/not/exist.yaml").is_err());
    }

    #[test]
    fn test_parse_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let config = chain_config_parser(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.network, Network::Custom("kurtosis".to_string()));
        assert_eq!(config.electra_fork_version, fixed_bytes!("0x60000038"));
        assert_eq!(config.electra_fork_epoch, 10);
        assert_eq!(config.fulu_fork_epoch, FAR_FUTURE_EPOCH);
    }
}
