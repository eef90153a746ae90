use blst::{
    BLST_ERROR, blst_scalar,
    min_pk::{AggregateSignature as BlstAggregateSignature, Signature as BlstSignature},
};
use rand::Rng;

use crate::{
    constants::{DST, SIGNATURE_COMPRESSED_LENGTH, SIGNATURE_UNCOMPRESSED_LENGTH},
    errors::BLSError,
    pubkey::PubKey,
    signature::BLSSignature,
    signature_set::SignatureSet,
    traits::{Aggregatable, BatchVerifiable, Verifiable},
};

/// Bits of randomness per set in batch verification.
const RAND_BITS: usize = 64;

impl From<BlstSignature> for BLSSignature {
    fn from(value: BlstSignature) -> Self {
        BLSSignature::from_compressed(value.compress())
    }
}

impl BLSSignature {
    /// Deserialize a compressed (96 bytes) or uncompressed (192 bytes) signature and check that
    /// it lies in the G2 subgroup.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BLSError> {
        BLSError::check_length(
            bytes.len(),
            [SIGNATURE_COMPRESSED_LENGTH, SIGNATURE_UNCOMPRESSED_LENGTH],
        )?;
        Ok(BlstSignature::sig_validate(bytes, false)?.into())
    }

    pub fn to_blst_signature(&self) -> Result<BlstSignature, BLSError> {
        Ok(BlstSignature::from_bytes(&self.inner)?)
    }

    /// Uncompressed encoding.
    pub fn serialize_uncompressed(&self) -> Result<[u8; SIGNATURE_UNCOMPRESSED_LENGTH], BLSError> {
        Ok(self.to_blst_signature()?.serialize())
    }
}

impl Verifiable for BLSSignature {
    type Error = BLSError;

    fn verify(&self, pubkey: &PubKey, message: &[u8]) -> Result<bool, BLSError> {
        let signature = self.to_blst_signature()?;
        let public_key = pubkey.to_blst_pubkey()?;

        Ok(
            signature.verify(true, message, DST, &[], &public_key, false)
                == BLST_ERROR::BLST_SUCCESS,
        )
    }

    fn fast_aggregate_verify<'a, P>(&self, pubkeys: P, message: &[u8]) -> Result<bool, BLSError>
    where
        P: AsRef<[&'a PubKey]>,
    {
        if pubkeys.as_ref().is_empty() {
            return Ok(false);
        }
        let signature = self.to_blst_signature()?;
        let public_keys = pubkeys
            .as_ref()
            .iter()
            .map(|key| key.to_blst_pubkey())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(signature.fast_aggregate_verify(
            true,
            message,
            DST,
            &public_keys.iter().collect::<Vec<_>>(),
        ) == BLST_ERROR::BLST_SUCCESS)
    }
}

impl BatchVerifiable for BLSSignature {
    type Error = BLSError;

    fn verify_multiple(sets: &[SignatureSet]) -> Result<bool, BLSError> {
        if sets.is_empty() {
            return Ok(false);
        }

        let mut rng = rand::rng();
        let mut signatures = Vec::with_capacity(sets.len());
        let mut public_keys = Vec::with_capacity(sets.len());
        let mut scalars = Vec::with_capacity(sets.len());
        for set in sets {
            signatures.push(set.signature.to_blst_signature()?);
            public_keys.push(set.pubkey.to_blst_pubkey()?);

            let mut random = 0u64;
            while random == 0 {
                random = rng.random();
            }
            let mut scalar = blst_scalar::default();
            scalar.b[..8].copy_from_slice(&random.to_le_bytes());
            scalars.push(scalar);
        }

        let messages = sets
            .iter()
            .map(|set| set.message.as_slice())
            .collect::<Vec<_>>();

        Ok(BlstSignature::verify_multiple_aggregate_signatures(
            &messages,
            DST,
            &public_keys.iter().collect::<Vec<_>>(),
            false,
            &signatures.iter().collect::<Vec<_>>(),
            true,
            &scalars,
            RAND_BITS,
        ) == BLST_ERROR::BLST_SUCCESS)
    }
}

impl Aggregatable<BLSSignature> for BLSSignature {
    type Error = BLSError;

    fn aggregate(signatures: &[&BLSSignature]) -> Result<BLSSignature, BLSError> {
        if signatures.is_empty() {
            return Err(BLSError::EmptyAggregate);
        }
        let signatures = signatures
            .iter()
            .map(|signature| signature.to_blst_signature())
            .collect::<Result<Vec<_>, _>>()?;
        let aggregate_signature =
            BlstAggregateSignature::aggregate(&signatures.iter().collect::<Vec<_>>(), true)?;
        Ok(aggregate_signature.to_signature().into())
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::hex;

    use super::*;
    use crate::{PrivateKey, traits::Signable};

    const MESSAGE: &[u8] = b"lodestarlodestarlodestarlodestar";
    const PUBKEY: &str = "8ae7e5822ba97ab07877ea318e747499da648b27302414f9d0b9bb7e3646d248be90c9fdaddfdb93485a6e9334f01093";
    const SIGNATURE_COMPRESSED: &str = "81faa68cb2d12b67c54a5a8ac52a7f351f187e4a4f446296c46d56b961159d52ad34a3015cff5753743c1ac2ec7ddbb708dc18431e8b9a53738a5fd08db1981711ae7f6669b9f0486c20546e3bd9e7a1d6cf239563a4b4ffbe0f572086c735aa";
    const SIGNATURE_UNCOMPRESSED: &str = "01faa68cb2d12b67c54a5a8ac52a7f351f187e4a4f446296c46d56b961159d52ad34a3015cff5753743c1ac2ec7ddbb708dc18431e8b9a53738a5fd08db1981711ae7f6669b9f0486c20546e3bd9e7a1d6cf239563a4b4ffbe0f572086c735aa0aa269bc3fccc963c752b96499f0ba79750ca53eb90a0feb116387b59e40baa427f75bea3094ae9123d35cd543db9e1d07a95a35d5f7371f7315306603c41c473b8bf3af1a812c5ee121cfcdb73536ad28631ded94f86e97684f5f8a0bbd0a3d";

    fn keys(count: u8) -> Vec<PrivateKey> {
        (1..=count)
            .map(|seed| PrivateKey::from_ikm(&[seed; 32]).unwrap())
            .collect()
    }

    #[test]
    fn test_known_signature_verifies() {
        let pubkey = PubKey::from_bytes(&hex::decode(PUBKEY).unwrap()).unwrap();
        let compressed =
            BLSSignature::from_bytes(&hex::decode(SIGNATURE_COMPRESSED).unwrap()).unwrap();
        let uncompressed =
            BLSSignature::from_bytes(&hex::decode(SIGNATURE_UNCOMPRESSED).unwrap()).unwrap();

        assert_eq!(compressed, uncompressed);
        assert_eq!(
            compressed.serialize_uncompressed().unwrap().as_slice(),
            hex::decode(SIGNATURE_UNCOMPRESSED).unwrap().as_slice()
        );
        assert!(compressed.verify(&pubkey, MESSAGE).unwrap());
        assert!(!compressed.verify(&pubkey, b"another message").unwrap());
        assert!(compressed.fast_aggregate_verify([&pubkey], MESSAGE).unwrap());
    }

    #[test]
    fn test_signature_length_is_checked() {
        assert_eq!(
            BLSSignature::from_bytes(&[0u8; 95]),
            Err(BLSError::InvalidEncodingLength {
                actual: 95,
                expected: [96, 192]
            })
        );
    }

    #[test]
    fn test_fast_aggregate_verify() {
        let keys = keys(4);
        let pubkeys = keys.iter().map(PrivateKey::public_key).collect::<Result<Vec<_>, _>>().unwrap();
        let signatures = keys
            .iter()
            .map(|key| key.sign(MESSAGE))
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        let aggregate =
            BLSSignature::aggregate(&signatures.iter().collect::<Vec<_>>()).unwrap();

        let pubkey_refs = pubkeys.iter().collect::<Vec<_>>();
        assert!(aggregate.fast_aggregate_verify(&pubkey_refs, MESSAGE).unwrap());
        assert!(!aggregate.fast_aggregate_verify(&pubkey_refs[1..], MESSAGE).unwrap());
        assert!(!aggregate.fast_aggregate_verify(Vec::<&PubKey>::new(), MESSAGE).unwrap());
    }

    #[test]
    fn test_verify_multiple() {
        let keys = keys(3);
        let mut sets = keys
            .iter()
            .enumerate()
            .map(|(index, key)| {
                let message = vec![index as u8; 32];
                let signature = key.sign(&message).unwrap();
                SignatureSet::new(key.public_key().unwrap(), message, signature)
            })
            .collect::<Vec<_>>();

        assert!(BLSSignature::verify_multiple(&sets).unwrap());
        assert!(!BLSSignature::verify_multiple(&[]).unwrap());

        sets[1].message = vec![0xff; 32];
        assert!(!BLSSignature::verify_multiple(&sets).unwrap());
    }
}
