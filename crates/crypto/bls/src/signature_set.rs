use crate::{BLSSignature, PubKey};

/// One independent `(message, public key, signature)` triple of a batch verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureSet {
    pub pubkey: PubKey,
    pub message: Vec<u8>,
    pub signature: BLSSignature,
}

impl SignatureSet {
    pub fn new(pubkey: PubKey, message: impl Into<Vec<u8>>, signature: BLSSignature) -> Self {
        Self {
            pubkey,
            message: message.into(),
            signature,
        }
    }
}
