use std::fmt;

use alloy_primitives::B256;

/// A BLS secret scalar, big-endian.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    pub(crate) inner: B256,
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}
