use alloy_primitives::B256;

/// Common hashing function for Merkle trees.
pub fn hash_concat(h1: &[u8], h2: &[u8]) -> B256 {
    ethereum_hashing::hash32_concat(h1, h2).into()
}

/// Mix the length of a list into the root of its data subtree.
pub fn mix_in_length(root: B256, length: usize) -> B256 {
    hash_concat(root.as_slice(), length_chunk(length).as_slice())
}

/// The 32-byte leaf holding a list length, little-endian and zero padded.
pub fn length_chunk(length: usize) -> B256 {
    let mut chunk = [0u8; 32];
    chunk[..8].copy_from_slice(&(length as u64).to_le_bytes());
    B256::from(chunk)
}
