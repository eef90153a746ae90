use crate::{BLSSignature, PubKey, SignatureSet};

pub trait Aggregatable<T> {
    type Error;

    fn aggregate(items: &[&T]) -> Result<T, Self::Error>;
}

pub trait Signable {
    type Error;

    fn sign(&self, message: &[u8]) -> Result<BLSSignature, Self::Error>;
}

pub trait Verifiable {
    type Error;

    /// Verifies a BLS signature against a public key and message.
    ///
    /// # Arguments
    /// * `pubkey` - The public key to verify against
    /// * `message` - The message that was signed
    ///
    /// # Returns
    /// * `Result<bool, BLSError>` - Ok(true) if the signature is valid, Ok(false) if verification
    ///   fails, or Err if there are issues with signature or public key bytes
    fn verify(&self, pubkey: &PubKey, message: &[u8]) -> Result<bool, Self::Error>;

    /// Verifies the signature against a message using an aggregate of multiple public keys.
    ///
    /// An empty key list never verifies.
    fn fast_aggregate_verify<'a, P>(&self, pubkeys: P, message: &[u8]) -> Result<bool, Self::Error>
    where
        P: AsRef<[&'a PubKey]>;
}

/// Batch verification of independent signature sets.
pub trait BatchVerifiable {
    type Error;

    /// Returns `Ok(true)` only if every set verifies. An empty batch never verifies.
    fn verify_multiple(sets: &[SignatureSet]) -> Result<bool, Self::Error>;
}
