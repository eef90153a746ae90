use std::str::FromStr;

use alloy_primitives::hex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ssz::Encode;
use ssz_derive::{Decode, Encode};
use ssz_types::{FixedVector, typenum::U48};
use tree_hash_derive::TreeHash;
use vista_merkle::{MerkleError, MerkleNodes, index::GeneralizedIndex};

use crate::{constants::PUBKEY_COMPRESSED_LENGTH, errors::BLSError};

/// A compressed G1 public key as it appears in SSZ containers.
///
/// Construction through SSZ or serde does not validate the point; use
/// [`PubKey::from_bytes`] when the key comes from an untrusted source.
#[derive(Debug, PartialEq, Clone, Encode, Decode, TreeHash, Default, Eq, Hash)]
pub struct PubKey {
    pub inner: FixedVector<u8, U48>,
}

impl Serialize for PubKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let val = format!("0x{}", hex::encode(self.inner.as_ssz_bytes()));
        serializer.serialize_str(&val)
    }
}

impl<'de> Deserialize<'de> for PubKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let result: String = Deserialize::deserialize(deserializer)?;
        let result = hex::decode(&result).map_err(serde::de::Error::custom)?;
        let key = FixedVector::new(result)
            .map_err(|err| serde::de::Error::custom(format!("{err:?}")))?;
        Ok(Self { inner: key })
    }
}

impl PubKey {
    /// Compressed encoding.
    pub fn to_bytes(&self) -> &[u8] {
        self.inner.iter().as_slice()
    }

    pub(crate) fn from_compressed(bytes: [u8; PUBKEY_COMPRESSED_LENGTH]) -> Self {
        Self {
            inner: FixedVector::from(bytes.to_vec()),
        }
    }
}

impl FromStr for PubKey {
    type Err = BLSError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let clean_str = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(clean_str).map_err(|_| BLSError::InvalidHexString)?;

        BLSError::check_length(bytes.len(), [PUBKEY_COMPRESSED_LENGTH; 2])?;

        Ok(PubKey {
            inner: FixedVector::from(bytes),
        })
    }
}

impl MerkleNodes for PubKey {
    fn merkle_node(&self, index: GeneralizedIndex) -> Result<alloy_primitives::B256, MerkleError> {
        self.inner.merkle_node(index)
    }
}
