//! Local mail store.
//!
//! An append-only, insertion-ordered collection of [`EncryptedRecord`]s
//! persisted as one JSON array under a single backend key:
//!
//! ```text
//! [{"hash":"0x..","ciphertext":"0x..","timestamp":1700000000000,"from":"a@zamail.com","to":"b@zamail.com"}, ...]
//! ```
//!
//! - **Append-only**: no update or delete; clearing means clearing the backend
//! - **No uniqueness**: the same digest may be appended twice
//! - **Lenient reads**: each entry is read on its own; an entry that is not a
//!   valid record is skipped by queries but kept in place on rewrite. Text
//!   that is not a JSON array is treated as empty, and the next append moves
//!   it aside to `<key>.corrupt` before writing a fresh collection
//! - **No caching**: every call reads the backend, so writes made through
//!   another handle on the same medium are observed

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use tracing::{debug, info, warn};

use crate::backend::{StorageBackend, StorageError};
use crate::codec::CodecError;
use crate::crypto::from_prefixed_hex;
use crate::identifier::Identifier;

/// Suffix of the key holding a collection that failed to parse
pub const CORRUPT_SUFFIX: &str = ".corrupt";

/// Error types for store operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("persistence error: {0}")]
    Persistence(#[from] StorageError),
    #[error("failed to serialize mail collection: {0}")]
    Serialize(String),
}

/// One sealed mail as persisted
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedRecord {
    /// Digest of the canonical plaintext (`0x` + 64 hex)
    #[serde(rename = "hash")]
    pub digest: String,
    /// `0x`-prefixed hex of the obfuscated canonical bytes
    pub ciphertext: String,
    /// Milliseconds since the Unix epoch
    #[serde(rename = "timestamp")]
    pub created_at: u64,
    #[serde(rename = "from")]
    pub sender: Identifier,
    #[serde(rename = "to")]
    pub recipient: Identifier,
}

impl EncryptedRecord {
    /// Raw ciphertext bytes
    pub fn ciphertext_bytes(&self) -> Result<Vec<u8>, CodecError> {
        from_prefixed_hex(&self.ciphertext)
    }
}

/// Persisted collection as read from the backend
enum Collection {
    /// Entries as stored, so unreadable ones survive a rewrite byte for byte
    Entries(Vec<Box<RawValue>>),
    /// Text that is not a JSON array
    Unreadable(String),
}

/// Mail store over a storage backend
pub struct MailStore<B: StorageBackend> {
    /// Persistence backend
    backend: B,
    /// Key of the collection in the backend
    key: String,
}

impl<B: StorageBackend> MailStore<B> {
    /// Create a store reading and writing the collection under `key`
    pub fn new(backend: B, key: impl Into<String>) -> Self {
        Self { backend, key: key.into() }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Access the backend (for inspection in tests)
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Read the persisted collection
    fn load(&self) -> Result<Collection, StorageError> {
        let Some(raw) = self.backend.get_item(&self.key)? else {
            return Ok(Collection::Entries(Vec::new()));
        };
        match serde_json::from_str(&raw) {
            Ok(entries) => Ok(Collection::Entries(entries)),
            Err(e) => {
                warn!(key = %self.key, error = %e, "stored mail collection is unreadable");
                Ok(Collection::Unreadable(raw))
            }
        }
    }

    /// Append a record to the end of the collection
    ///
    /// Fails only when the backend refuses the write (quota, unavailable).
    pub fn append(&mut self, record: EncryptedRecord) -> Result<(), StoreError> {
        let mut entries = match self.load()? {
            Collection::Entries(entries) => entries,
            Collection::Unreadable(raw) => {
                let aside = format!("{}{}", self.key, CORRUPT_SUFFIX);
                self.backend.set_item(&aside, &raw)?;
                warn!(key = %aside, "moved unreadable mail collection aside");
                Vec::new()
            }
        };

        let digest = record.digest.clone();
        let entry = serde_json::to_string(&record)
            .and_then(RawValue::from_string)
            .map_err(|e| StoreError::Serialize(e.to_string()))?;
        entries.push(entry);

        let json = serde_json::to_string(&entries)
            .map_err(|e| StoreError::Serialize(e.to_string()))?;
        self.backend.set_item(&self.key, &json)?;

        info!(digest = %digest, total = entries.len(), "saved encrypted mail");
        Ok(())
    }

    /// All readable records in insertion order; empty on read errors
    #[must_use]
    pub fn records(&self) -> Vec<EncryptedRecord> {
        let entries = match self.load() {
            Ok(Collection::Entries(entries)) => entries,
            Ok(Collection::Unreadable(_)) => Vec::new(),
            Err(e) => {
                warn!(key = %self.key, error = %e, "failed to read mail collection");
                Vec::new()
            }
        };

        entries
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                match serde_json::from_str::<EncryptedRecord>(entry.get()) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!(key = %self.key, index, error = %e, "skipping unreadable mail record");
                        None
                    }
                }
            })
            .collect()
    }

    /// Records addressed to `identifier` (case-insensitive), insertion order
    #[must_use]
    pub fn query_by_recipient(&self, identifier: &Identifier) -> Vec<EncryptedRecord> {
        let matches: Vec<_> = self
            .records()
            .into_iter()
            .filter(|r| r.recipient.matches(identifier))
            .collect();
        debug!(recipient = %identifier, count = matches.len(), "queried inbox records");
        matches
    }

    /// Records sent by `identifier` (case-insensitive), insertion order
    #[must_use]
    pub fn query_by_sender(&self, identifier: &Identifier) -> Vec<EncryptedRecord> {
        let matches: Vec<_> = self
            .records()
            .into_iter()
            .filter(|r| r.sender.matches(identifier))
            .collect();
        debug!(sender = %identifier, count = matches.len(), "queried outbox records");
        matches
    }

    /// First record with the given digest
    #[must_use]
    pub fn find_by_digest(&self, digest: &str) -> Option<EncryptedRecord> {
        self.records().into_iter().find(|r| r.digest == digest)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================
// TESTS
// ============================================================
