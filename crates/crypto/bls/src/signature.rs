use std::str::FromStr;

use alloy_primitives::hex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ssz::Encode;
use ssz_derive::{Decode, Encode};
use ssz_types::{FixedVector, typenum::U96};
use tree_hash_derive::TreeHash;
use vista_merkle::{MerkleError, MerkleNodes, index::GeneralizedIndex};

use crate::{constants::SIGNATURE_COMPRESSED_LENGTH, errors::BLSError};

/// A compressed G2 signature as it appears in SSZ containers.
#[derive(Debug, PartialEq, Clone, Encode, Decode, TreeHash, Eq, Hash)]
pub struct BLSSignature {
    pub inner: FixedVector<u8, U96>,
}

impl Default for BLSSignature {
    /// The compressed point at infinity, the signature of an empty aggregate.
    fn default() -> Self {
        let mut bytes = vec![0u8; SIGNATURE_COMPRESSED_LENGTH];
        bytes[0] = 0xc0;
        Self {
            inner: FixedVector::from(bytes),
        }
    }
}

impl Serialize for BLSSignature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let val = format!("0x{}", hex::encode(self.inner.as_ssz_bytes()));
        serializer.serialize_str(&val)
    }
}

impl<'de> Deserialize<'de> for BLSSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let result: String = Deserialize::deserialize(deserializer)?;
        let result = hex::decode(&result).map_err(serde::de::Error::custom)?;
        let signature = FixedVector::new(result)
            .map_err(|err| serde::de::Error::custom(format!("{err:?}")))?;
        Ok(Self { inner: signature })
    }
}

impl BLSSignature {
    /// Compressed encoding.
    pub fn to_bytes(&self) -> &[u8] {
        self.inner.iter().as_slice()
    }

    pub(crate) fn from_compressed(bytes: [u8; SIGNATURE_COMPRESSED_LENGTH]) -> Self {
        Self {
            inner: FixedVector::from(bytes.to_vec()),
        }
    }
}

impl FromStr for BLSSignature {
    type Err = BLSError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let clean_str = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(clean_str).map_err(|_| BLSError::InvalidHexString)?;

        BLSError::check_length(bytes.len(), [SIGNATURE_COMPRESSED_LENGTH; 2])?;

        Ok(BLSSignature {
            inner: FixedVector::from(bytes),
        })
    }
}

impl MerkleNodes for BLSSignature {
    fn merkle_node(&self, index: GeneralizedIndex) -> Result<alloy_primitives::B256, MerkleError> {
        self.inner.merkle_node(index)
    }
}
