use blst::min_pk::{AggregatePublicKey as BlstAggregatePublicKey, PublicKey as BlstPublicKey};

use crate::{
    constants::{PUBKEY_COMPRESSED_LENGTH, PUBKEY_UNCOMPRESSED_LENGTH},
    errors::BLSError,
    pubkey::PubKey,
    traits::Aggregatable,
};

impl From<BlstPublicKey> for PubKey {
    fn from(value: BlstPublicKey) -> Self {
        PubKey::from_compressed(value.compress())
    }
}

impl PubKey {
    /// Deserialize and validate a compressed (48 bytes) or uncompressed (96 bytes) key.
    ///
    /// The identity point and points outside the G1 subgroup are rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BLSError> {
        BLSError::check_length(
            bytes.len(),
            [PUBKEY_COMPRESSED_LENGTH, PUBKEY_UNCOMPRESSED_LENGTH],
        )?;
        Ok(BlstPublicKey::key_validate(bytes)?.into())
    }

    pub fn to_blst_pubkey(&self) -> Result<BlstPublicKey, BLSError> {
        Ok(BlstPublicKey::key_validate(&self.inner)?)
    }

    /// Uncompressed encoding.
    pub fn serialize_uncompressed(&self) -> Result<[u8; PUBKEY_UNCOMPRESSED_LENGTH], BLSError> {
        Ok(self.to_blst_pubkey()?.serialize())
    }
}

impl Aggregatable<PubKey> for PubKey {
    type Error = BLSError;

    fn aggregate(public_keys: &[&PubKey]) -> Result<PubKey, BLSError> {
        if public_keys.is_empty() {
            return Err(BLSError::EmptyAggregate);
        }
        let public_keys = public_keys
            .iter()
            .map(|public_key| public_key.to_blst_pubkey())
            .collect::<Result<Vec<_>, _>>()?;
        let aggregate_public_key =
            BlstAggregatePublicKey::aggregate(&public_keys.iter().collect::<Vec<_>>(), false)?;
        Ok(aggregate_public_key.to_public_key().into())
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::hex;
    use rstest::rstest;

    use super::*;

    const PUBKEY_COMPRESSED: &str = "8ae7e5822ba97ab07877ea318e747499da648b27302414f9d0b9bb7e3646d248be90c9fdaddfdb93485a6e9334f01093";
    const PUBKEY_UNCOMPRESSED: &str = "0ae7e5822ba97ab07877ea318e747499da648b27302414f9d0b9bb7e3646d248be90c9fdaddfdb93485a6e9334f0109301f36856007e1bc875ab1b00dbf47f9ead16c5562d889d8b270002ade81e78d473204fcb51ede8659bce3d95c67903bc";

    #[test]
    fn test_compressed_and_uncompressed_forms_agree() {
        let compressed = hex::decode(PUBKEY_COMPRESSED).unwrap();
        let uncompressed = hex::decode(PUBKEY_UNCOMPRESSED).unwrap();

        let from_compressed = PubKey::from_bytes(&compressed).unwrap();
        let from_uncompressed = PubKey::from_bytes(&uncompressed).unwrap();

        assert_eq!(from_compressed, from_uncompressed);
        assert_eq!(from_compressed.to_bytes(), compressed.as_slice());
        assert_eq!(
            from_compressed.serialize_uncompressed().unwrap().as_slice(),
            uncompressed.as_slice()
        );
    }

    #[rstest]
    #[case(0)]
    #[case(47)]
    #[case(49)]
    #[case(192)]
    fn test_wrong_length_is_rejected(#[case] length: usize) {
        assert_eq!(
            PubKey::from_bytes(&vec![0u8; length]),
            Err(BLSError::InvalidEncodingLength {
                actual: length,
                expected: [48, 96]
            })
        );
    }

    #[test]
    fn test_identity_is_rejected() {
        let mut infinity = [0u8; 48];
        infinity[0] = 0xc0;
        assert_eq!(
            PubKey::from_bytes(&infinity),
            Err(BLSError::PointAtInfinity)
        );
    }

    #[test]
    fn test_garbage_is_rejected() {
        // Compression flag unset on a 48-byte input.
        let mut garbage = hex::decode(PUBKEY_COMPRESSED).unwrap();
        garbage[0] &= 0x7f;
        assert_eq!(PubKey::from_bytes(&garbage), Err(BLSError::BadEncoding));
    }
}
