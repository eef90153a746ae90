use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MerkleError {
    #[error("Generalized index {0} is outside the tree")]
    InvalidGeneralizedIndex(u64),
    #[error("{leaves} leaves do not fit in a tree of depth {depth}")]
    TooManyLeaves { leaves: usize, depth: u64 },
    #[error("Invalid multiproof descriptor: {0}")]
    InvalidDescriptor(&'static str),
    #[error("Invalid proof: {0}")]
    InvalidProof(String),
    #[error("At least one generalized index must be requested")]
    EmptyIndices,
}
