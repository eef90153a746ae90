use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Consensus forks in activation order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum ForkName {
    #[default]
    Phase0,
    Altair,
    Bellatrix,
    Capella,
    Deneb,
    Electra,
    Fulu,
}

impl ForkName {
    pub const ALL: [ForkName; 7] = [
        ForkName::Phase0,
        ForkName::Altair,
        ForkName::Bellatrix,
        ForkName::Capella,
        ForkName::Deneb,
        ForkName::Electra,
        ForkName::Fulu,
    ];

    pub fn is_altair_or_later(self) -> bool {
        self >= ForkName::Altair
    }

    pub fn is_bellatrix_or_later(self) -> bool {
        self >= ForkName::Bellatrix
    }

    pub fn is_capella_or_later(self) -> bool {
        self >= ForkName::Capella
    }

    pub fn is_deneb_or_later(self) -> bool {
        self >= ForkName::Deneb
    }

    pub fn is_electra_or_later(self) -> bool {
        self >= ForkName::Electra
    }

    pub fn is_fulu_or_later(self) -> bool {
        self >= ForkName::Fulu
    }

    pub fn previous(self) -> Option<ForkName> {
        let position = Self::ALL.iter().position(|fork| *fork == self)?;
        position.checked_sub(1).map(|previous| Self::ALL[previous])
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ForkName::Phase0 => "phase0",
            ForkName::Altair => "altair",
            ForkName::Bellatrix => "bellatrix",
            ForkName::Capella => "capella",
            ForkName::Deneb => "deneb",
            ForkName::Electra => "electra",
            ForkName::Fulu => "fulu",
        }
    }
}

impl fmt::Display for ForkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown fork name: {0}")]
pub struct UnknownForkName(pub String);

impl FromStr for ForkName {
    type Err = UnknownForkName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|fork| fork.as_str() == name)
            .ok_or(UnknownForkName(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("phase0", ForkName::Phase0)]
    #[case("Capella", ForkName::Capella)]
    #[case("FULU", ForkName::Fulu)]
    fn test_parse_fork_name(#[case] input: &str, #[case] expected: ForkName) {
        assert_eq!(input.parse::<ForkName>().unwrap(), expected);
        assert_eq!(expected.to_string(), input.to_ascii_lowercase());
    }

    #[test]
    fn test_fork_order() {
        assert!(ForkName::Electra.is_deneb_or_later());
        assert!(!ForkName::Deneb.is_electra_or_later());
        assert_eq!(ForkName::Phase0.previous(), None);
        assert_eq!(ForkName::Fulu.previous(), Some(ForkName::Electra));
        assert!("gloas".parse::<ForkName>().is_err());
    }
}
