//! Two-way index between validator public keys and validator indices.

use std::{collections::HashMap, fs, path::Path};

use anyhow::{Context, anyhow, ensure};
use parking_lot::RwLock;
use tracing::{debug, info};
use vista_bls::PubKey;

use crate::{errors::StateError, view::BeaconStateView};

const MAGIC: &[u8; 8] = b"VSTAPUBK";
const HEADER_LEN: usize = MAGIC.len() + 8;
const PUBKEY_LEN: usize = 48;

#[derive(Debug, Default)]
struct PubkeyIndex {
    pubkey_to_index: HashMap<PubKey, u64>,
    index_to_pubkey: Vec<PubKey>,
}

/// Shared between every state decoded from the same chain. Indices are append-only.
#[derive(Debug, Default)]
pub struct PubkeyCache {
    inner: RwLock<PubkeyIndex>,
}

impl PubkeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let cache = Self::default();
        cache.ensure_capacity(capacity);
        cache
    }

    pub fn len(&self) -> usize {
        self.inner.read().index_to_pubkey.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserve room for `capacity` keys. Growing past it still works.
    pub fn ensure_capacity(&self, capacity: usize) {
        let mut inner = self.inner.write();
        let additional = capacity.saturating_sub(inner.index_to_pubkey.len());
        inner.index_to_pubkey.reserve(additional);
        inner.pubkey_to_index.reserve(additional);
    }

    pub fn pubkey_to_index(&self, pubkey: &PubKey) -> Option<u64> {
        self.inner.read().pubkey_to_index.get(pubkey).copied()
    }

    pub fn index_to_pubkey(&self, index: u64) -> Option<PubKey> {
        self.inner.read().index_to_pubkey.get(index as usize).cloned()
    }

    /// Record `pubkeys` as the keys of validators `start, start + 1, ...`.
    ///
    /// Indices that are already known are skipped, so concurrent synchronizations from the same
    /// registry agree. A gap after the last known index stops the insertion.
    pub fn extend_from(&self, start: u64, pubkeys: impl IntoIterator<Item = PubKey>) {
        let mut inner = self.inner.write();
        for (index, pubkey) in (start..).zip(pubkeys) {
            let known = inner.index_to_pubkey.len() as u64;
            if index < known {
                continue;
            }
            if index > known {
                break;
            }
            inner.pubkey_to_index.entry(pubkey.clone()).or_insert(index);
            inner.index_to_pubkey.push(pubkey);
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let inner = self.inner.read();
        let mut bytes = Vec::with_capacity(HEADER_LEN + inner.index_to_pubkey.len() * PUBKEY_LEN);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&(inner.index_to_pubkey.len() as u64).to_le_bytes());
        for pubkey in &inner.index_to_pubkey {
            bytes.extend_from_slice(pubkey.to_bytes());
        }
        fs::write(path, bytes)
            .with_context(|| format!("Failed to write pubkey index to {}", path.display()))?;
        info!(
            path = %path.display(),
            count = inner.index_to_pubkey.len(),
            "Saved pubkey index"
        );
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read pubkey index from {}", path.display()))?;
        ensure!(
            bytes.len() >= HEADER_LEN && bytes[..MAGIC.len()] == MAGIC[..],
            "{} is not a pubkey index file",
            path.display()
        );

        let mut count = [0u8; 8];
        count.copy_from_slice(&bytes[MAGIC.len()..HEADER_LEN]);
        let count = u64::from_le_bytes(count);
        let body = &bytes[HEADER_LEN..];
        ensure!(
            usize::try_from(count)
                .ok()
                .and_then(|count| count.checked_mul(PUBKEY_LEN))
                == Some(body.len()),
            "Pubkey index declares {count} keys but holds {} bytes",
            body.len()
        );

        let cache = Self::with_capacity(body.len() / PUBKEY_LEN);
        let pubkeys = body
            .chunks_exact(PUBKEY_LEN)
            .enumerate()
            .map(|(index, bytes)| {
                PubKey::from_bytes(bytes)
                    .map_err(|err| anyhow!("Invalid public key at index {index}: {err}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        cache.extend_from(0, pubkeys);
        info!(path = %path.display(), count, "Loaded pubkey index");
        Ok(cache)
    }
}

impl BeaconStateView {
    /// Index the public keys of validators the shared pubkey cache has not seen yet.
    pub fn sync_pubkey_cache(&self) -> Result<(), StateError> {
        let known = self.pubkeys.len();
        let count = self.validator_count()?;
        if known >= count {
            return Ok(());
        }
        self.pubkeys.ensure_capacity(count);
        let pubkeys = (known as u64..count as u64)
            .map(|index| self.validator_pubkey(index))
            .collect::<Result<Vec<_>, _>>()?;
        self.pubkeys.extend_from(known as u64, pubkeys);
        debug!(added = count - known, total = count, "Synchronized pubkey index");
        Ok(())
    }
}
