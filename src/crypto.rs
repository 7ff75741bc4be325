//! Key derivation, content obfuscation and digests.
//!
//! - **Key derivation**: `Keccak-256(recipient || sender)`, 32 bytes
//! - **Obfuscation**: repeating-key XOR over the canonical bytes
//! - **Digest**: `0x`-prefixed hex of `Keccak-256(plaintext)`
//!
//! # Security Notes
//!
//! This is obfuscation, NOT confidentiality. The key is a pure function of
//! two public identifiers, so anyone who can read the directory can derive
//! it and recover every stored message. Replacing it with a real key
//! exchange changes who can decrypt and needs a product decision; keep the
//! scheme as is until then.
//!
//! - `MailKey` is zeroized on drop
//! - The digest is computed over the plaintext and is therefore a stable
//!   public reference to the content (usable for on-chain anchoring)

use sha3::{Digest, Keccak256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::codec::CodecError;
use crate::identifier::Identifier;

/// Derived key length in bytes
pub const KEY_SIZE: usize = 32;

/// Digest string length: "0x" + 64 hex characters
pub const DIGEST_HEX_LEN: usize = 2 + 2 * 32;

/// Symmetric key shared by a sender/recipient pair
/// Automatically zeroized on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MailKey([u8; KEY_SIZE]);

impl MailKey {
    /// Get the key bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for MailKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MailKey(..)")
    }
}

/// Keccak-256 of arbitrary data
#[must_use]
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Derive the pair key from the two identifiers
///
/// Order-sensitive: the recipient is hashed first, so swapping the roles
/// yields a different key. Both parties re-derive it from the record's
/// `from`/`to` fields.
#[must_use]
pub fn derive_key(sender: &Identifier, recipient: &Identifier) -> MailKey {
    let mut hasher = Keccak256::new();
    hasher.update(recipient.as_str().as_bytes());
    hasher.update(sender.as_str().as_bytes());
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&hasher.finalize());
    MailKey(key)
}

/// XOR `data` with `key` repeated to its length
///
/// Total for any non-empty key; an empty key leaves the data unchanged.
#[must_use]
pub fn obfuscate(data: &[u8], key: &[u8]) -> Vec<u8> {
    if key.is_empty() {
        return data.to_vec();
    }
    data.iter()
        .zip(key.iter().cycle())
        .map(|(byte, k)| byte ^ k)
        .collect()
}

/// Inverse of [`obfuscate`] (XOR is an involution under a fixed key)
#[must_use]
pub fn deobfuscate(data: &[u8], key: &[u8]) -> Vec<u8> {
    obfuscate(data, key)
}

/// Content digest of the canonical plaintext
#[must_use]
pub fn digest(plaintext: &[u8]) -> String {
    to_prefixed_hex(&keccak256(plaintext))
}

/// Encode bytes as `0x`-prefixed lowercase hex
#[must_use]
pub fn to_prefixed_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decode hex with an optional `0x` prefix
pub fn from_prefixed_hex(input: &str) -> Result<Vec<u8>, CodecError> {
    let digits = input.strip_prefix("0x").unwrap_or(input);
    hex::decode(digits).map_err(|e| CodecError::MalformedContent(format!("bad hex: {}", e)))
}
