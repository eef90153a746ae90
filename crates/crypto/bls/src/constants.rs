/// Domain separation tag of the proof-of-possession ciphersuite.
pub const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

pub const PUBKEY_COMPRESSED_LENGTH: usize = 48;
pub const PUBKEY_UNCOMPRESSED_LENGTH: usize = 96;
pub const SIGNATURE_COMPRESSED_LENGTH: usize = 96;
pub const SIGNATURE_UNCOMPRESSED_LENGTH: usize = 192;
