use std::sync::{Arc, LazyLock, Once, OnceLock};

use alloy_primitives::{aliases::B32, fixed_bytes};
use serde::Deserialize;
use tracing::warn;
use vista_consensus_misc::{
    constants::FAR_FUTURE_EPOCH, fork::Fork, fork_name::ForkName, misc::compute_epoch_at_slot,
};

/// Byte offset of `slot` in every beacon state layout (after `genesis_time` and
/// `genesis_validators_root`).
pub const STATE_SLOT_OFFSET: usize = 40;

static HAS_CHAIN_CONFIG_BEEN_INITIALIZED: Once = Once::new();

pub fn initialize_test_chain_config() {
    HAS_CHAIN_CONFIG_BEEN_INITIALIZED.call_once(|| {
        let _ = set_chain_config(DEV.clone());
    });
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Holesky,
    Sepolia,
    Hoodi,
    Dev,
    Custom(String),
}

impl<'de> Deserialize<'de> for Network {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match String::deserialize(deserializer)?.as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "holesky" => Ok(Network::Holesky),
            "sepolia" => Ok(Network::Sepolia),
            "hoodi" => Ok(Network::Hoodi),
            "dev" => Ok(Network::Dev),
            custom => Ok(Network::Custom(custom.to_string())),
        }
    }
}

static CHAIN_CONFIG: OnceLock<Arc<ChainConfig>> = OnceLock::new();

/// Install the process-wide [ChainConfig]. Only the first call takes effect; later calls hand
/// the rejected config back.
///
/// The config can be accessed using [chain_config].
pub fn set_chain_config(config: Arc<ChainConfig>) -> Result<(), Arc<ChainConfig>> {
    CHAIN_CONFIG.set(config)
}

/// Returns the [ChainConfig] installed by [set_chain_config], or mainnet when none was set.
pub fn chain_config() -> Arc<ChainConfig> {
    match CHAIN_CONFIG.get() {
        Some(config) => config.clone(),
        None => {
            warn!("Chain config wasn't set, falling back to mainnet");
            MAINNET.clone()
        }
    }
}

fn unscheduled() -> u64 {
    FAR_FUTURE_EPOCH
}

/// Runtime configuration of a network, in the consensus config YAML format.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct ChainConfig {
    pub preset_base: String,
    #[serde(rename = "CONFIG_NAME")]
    pub network: Network,

    // Genesis
    pub min_genesis_time: u64,
    pub genesis_fork_version: B32,
    pub genesis_delay: u64,

    // Forking
    pub altair_fork_version: B32,
    pub altair_fork_epoch: u64,
    pub bellatrix_fork_version: B32,
    pub bellatrix_fork_epoch: u64,
    pub capella_fork_version: B32,
    pub capella_fork_epoch: u64,
    pub deneb_fork_version: B32,
    pub deneb_fork_epoch: u64,
    pub electra_fork_version: B32,
    pub electra_fork_epoch: u64,
    #[serde(default)]
    pub fulu_fork_version: B32,
    #[serde(default = "unscheduled")]
    pub fulu_fork_epoch: u64,

    // Time parameters
    pub seconds_per_slot: u64,
    pub min_validator_withdrawability_delay: u64,
    pub shard_committee_period: u64,
}

impl ChainConfig {
    pub fn fork_version(&self, fork: ForkName) -> B32 {
        match fork {
            ForkName::Phase0 => self.genesis_fork_version,
            ForkName::Altair => self.altair_fork_version,
            ForkName::Bellatrix => self.bellatrix_fork_version,
            ForkName::Capella => self.capella_fork_version,
            ForkName::Deneb => self.deneb_fork_version,
            ForkName::Electra => self.electra_fork_version,
            ForkName::Fulu => self.fulu_fork_version,
        }
    }

    pub fn fork_epoch(&self, fork: ForkName) -> u64 {
        match fork {
            ForkName::Phase0 => 0,
            ForkName::Altair => self.altair_fork_epoch,
            ForkName::Bellatrix => self.bellatrix_fork_epoch,
            ForkName::Capella => self.capella_fork_epoch,
            ForkName::Deneb => self.deneb_fork_epoch,
            ForkName::Electra => self.electra_fork_epoch,
            ForkName::Fulu => self.fulu_fork_epoch,
        }
    }

    /// Latest fork scheduled at or before ``epoch``.
    pub fn fork_name_at_epoch(&self, epoch: u64) -> ForkName {
        ForkName::ALL
            .into_iter()
            .rev()
            .find(|fork| {
                let fork_epoch = self.fork_epoch(*fork);
                fork_epoch != FAR_FUTURE_EPOCH && fork_epoch <= epoch
            })
            .unwrap_or(ForkName::Phase0)
    }

    pub fn fork_name_at_slot(&self, slot: u64) -> ForkName {
        self.fork_name_at_epoch(compute_epoch_at_slot(slot))
    }

    /// The `Fork` record a state of ``fork`` carries after the upgrade.
    pub fn fork_at(&self, fork: ForkName) -> Fork {
        let previous = fork.previous().unwrap_or(ForkName::Phase0);
        Fork {
            previous_version: self.fork_version(previous),
            current_version: self.fork_version(fork),
            epoch: self.fork_epoch(fork),
        }
    }

    /// Infer the fork of an encoded beacon state from its slot, or `None` when the buffer is too
    /// short to hold one.
    pub fn fork_name_from_state_bytes(&self, bytes: &[u8]) -> Option<ForkName> {
        let slot_bytes = bytes.get(STATE_SLOT_OFFSET..STATE_SLOT_OFFSET + 8)?;
        let slot = u64::from_le_bytes(slot_bytes.try_into().ok()?);
        Some(self.fork_name_at_slot(slot))
    }
}

pub static MAINNET: LazyLock<Arc<ChainConfig>> = LazyLock::new(|| {
    ChainConfig {
        preset_base: "mainnet".to_string(),
        network: Network::Mainnet,
        min_genesis_time: 1606824000,
        genesis_fork_version: fixed_bytes!("0x00000000"),
        genesis_delay: 604800,
        altair_fork_version: fixed_bytes!("0x01000000"),
        altair_fork_epoch: 74240,
        bellatrix_fork_version: fixed_bytes!("0x02000000"),
        bellatrix_fork_epoch: 144896,
        capella_fork_version: fixed_bytes!("0x03000000"),
        capella_fork_epoch: 194048,
        deneb_fork_version: fixed_bytes!("0x04000000"),
        deneb_fork_epoch: 269568,
        electra_fork_version: fixed_bytes!("0x05000000"),
        electra_fork_epoch: 364032,
        fulu_fork_version: fixed_bytes!("0x06000000"),
        fulu_fork_epoch: 411392,
        seconds_per_slot: 12,
        min_validator_withdrawability_delay: 256,
        shard_committee_period: 256,
    }
    .into()
});

pub static HOLESKY: LazyLock<Arc<ChainConfig>> = LazyLock::new(|| {
    ChainConfig {
        preset_base: "mainnet".to_string(),
        network: Network::Holesky,
        min_genesis_time: 1695902100,
        genesis_fork_version: fixed_bytes!("0x01017000"),
        genesis_delay: 300,
        altair_fork_version: fixed_bytes!("0x02017000"),
        altair_fork_epoch: 0,
        bellatrix_fork_version: fixed_bytes!("0x03017000"),
        bellatrix_fork_epoch: 0,
        capella_fork_version: fixed_bytes!("0x04017000"),
        capella_fork_epoch: 256,
        deneb_fork_version: fixed_bytes!("0x05017000"),
        deneb_fork_epoch: 29696,
        electra_fork_version: fixed_bytes!("0x06017000"),
        electra_fork_epoch: 115968,
        fulu_fork_version: fixed_bytes!("0x07017000"),
        fulu_fork_epoch: 165120,
        seconds_per_slot: 12,
        min_validator_withdrawability_delay: 256,
        shard_committee_period: 256,
    }
    .into()
});

pub static SEPOLIA: LazyLock<Arc<ChainConfig>> = LazyLock::new(|| {
    ChainConfig {
        preset_base: "mainnet".to_string(),
        network: Network::Sepolia,
        min_genesis_time: 1655647200,
        genesis_fork_version: fixed_bytes!("0x90000069"),
        genesis_delay: 86400,
        altair_fork_version: fixed_bytes!("0x90000070"),
        altair_fork_epoch: 50,
        bellatrix_fork_version: fixed_bytes!("0x90000071"),
        bellatrix_fork_epoch: 100,
        capella_fork_version: fixed_bytes!("0x90000072"),
        capella_fork_epoch: 56832,
        deneb_fork_version: fixed_bytes!("0x90000073"),
        deneb_fork_epoch: 132608,
        electra_fork_version: fixed_bytes!("0x90000074"),
        electra_fork_epoch: 222464,
        fulu_fork_version: fixed_bytes!("0x90000075"),
        fulu_fork_epoch: 272640,
        seconds_per_slot: 12,
        min_validator_withdrawability_delay: 256,
        shard_committee_period: 256,
    }
    .into()
});

pub static HOODI: LazyLock<Arc<ChainConfig>> = LazyLock::new(|| {
    ChainConfig {
        preset_base: "mainnet".to_string(),
        network: Network::Hoodi,
        min_genesis_time: 1742212800,
        genesis_fork_version: fixed_bytes!("0x10000910"),
        genesis_delay: 600,
        altair_fork_version: fixed_bytes!("0x20000910"),
        altair_fork_epoch: 0,
        bellatrix_fork_version: fixed_bytes!("0x30000910"),
        bellatrix_fork_epoch: 0,
        capella_fork_version: fixed_bytes!("0x40000910"),
        capella_fork_epoch: 0,
        deneb_fork_version: fixed_bytes!("0x50000910"),
        deneb_fork_epoch: 0,
        electra_fork_version: fixed_bytes!("0x60000910"),
        electra_fork_epoch: 2048,
        fulu_fork_version: fixed_bytes!("0x70000910"),
        fulu_fork_epoch: 50688,
        seconds_per_slot: 12,
        min_validator_withdrawability_delay: 256,
        shard_committee_period: 256,
    }
    .into()
});

/// Local network with every fork active from genesis.
pub static DEV: LazyLock<Arc<ChainConfig>> = LazyLock::new(|| {
    ChainConfig {
        preset_base: "mainnet".to_string(),
        network: Network::Dev,
        min_genesis_time: 1606824000,
        genesis_fork_version: fixed_bytes!("0x00000000"),
        genesis_delay: 0,
        altair_fork_version: fixed_bytes!("0x01000000"),
        altair_fork_epoch: 0,
        bellatrix_fork_version: fixed_bytes!("0x02000000"),
        bellatrix_fork_epoch: 0,
        capella_fork_version: fixed_bytes!("0x03000000"),
        capella_fork_epoch: 0,
        deneb_fork_version: fixed_bytes!("0x04000000"),
        deneb_fork_epoch: 0,
        electra_fork_version: fixed_bytes!("0x05000000"),
        electra_fork_epoch: 0,
        fulu_fork_version: fixed_bytes!("0x06000000"),
        fulu_fork_epoch: 0,
        seconds_per_slot: 12,
        min_validator_withdrawability_delay: 256,
        shard_committee_period: 256,
    }
    .into()
});

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, ForkName::Phase0)]
    #[case(74239, ForkName::Phase0)]
    #[case(74240, ForkName::Altair)]
    #[case(269568, ForkName::Deneb)]
    #[case(364032, ForkName::Electra)]
    #[case(411392, ForkName::Fulu)]
    fn test_mainnet_fork_at_epoch(#[case] epoch: u64, #[case] expected: ForkName) {
        assert_eq!(MAINNET.fork_name_at_epoch(epoch), expected);
    }

    #[test]
    fn test_fork_record() {
        let fork = MAINNET.fork_at(ForkName::Capella);
        assert_eq!(fork.previous_version, fixed_bytes!("0x02000000"));
        assert_eq!(fork.current_version, fixed_bytes!("0x03000000"));
        assert_eq!(fork.epoch, 194048);
        assert_eq!(DEV.fork_name_at_epoch(0), ForkName::Fulu);
    }

    #[test]
    fn test_fork_from_state_bytes() {
        let mut bytes = vec![0u8; 48];
        bytes[STATE_SLOT_OFFSET..].copy_from_slice(&(74240u64 * 32).to_le_bytes());
        assert_eq!(
            MAINNET.fork_name_from_state_bytes(&bytes),
            Some(ForkName::Altair)
        );
        assert_eq!(MAINNET.fork_name_from_state_bytes(&bytes[..47]), None);
    }

    #[test]
    fn test_fallback_to_mainnet() {
        // Nothing in this crate's tests installs a config.
        assert_eq!(chain_config().network, Network::Mainnet);
    }
}
