//! Seal and open mail content.
//!
//! ```text
//! seal:  Message → encode → canonical bytes ─┬→ digest          → hash
//!                                            └→ XOR(pair key)   → ciphertext
//! open:  record → hex decode → XOR(pair key from record from/to) → decode → Message
//! ```

use crate::codec::{decode, encode_with_limits, CodecError, Message};
use crate::config::Limits;
use crate::crypto::{deobfuscate, derive_key, digest, obfuscate, to_prefixed_hex};
use crate::identifier::Identifier;
use crate::store::EncryptedRecord;

/// Output of [`seal`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedMail {
    /// Digest of the canonical plaintext
    pub digest: String,
    /// Obfuscated canonical bytes (same length as the plaintext)
    pub ciphertext: Vec<u8>,
}

impl SealedMail {
    /// Build the persisted record for this mail
    #[must_use]
    pub fn into_record(
        self,
        sender: Identifier,
        recipient: Identifier,
        created_at: u64,
    ) -> EncryptedRecord {
        EncryptedRecord {
            digest: self.digest,
            ciphertext: to_prefixed_hex(&self.ciphertext),
            created_at,
            sender,
            recipient,
        }
    }
}

/// Seal with the standard limits
pub fn seal(message: &Message) -> Result<SealedMail, CodecError> {
    seal_with_limits(message, &Limits::STANDARD)
}

/// Encode, digest and obfuscate a message
pub fn seal_with_limits(message: &Message, limits: &Limits) -> Result<SealedMail, CodecError> {
    let plaintext = encode_with_limits(message, limits)?;
    let key = derive_key(&message.sender, &message.recipient);

    Ok(SealedMail {
        digest: digest(&plaintext),
        ciphertext: obfuscate(&plaintext, key.as_bytes()),
    })
}

/// Recover the message from raw ciphertext and the two identifiers
pub fn open_ciphertext(
    ciphertext: &[u8],
    sender: &Identifier,
    recipient: &Identifier,
) -> Result<Message, CodecError> {
    let key = derive_key(sender, recipient);
    decode(&deobfuscate(ciphertext, key.as_bytes()))
}

/// Recover the message stored in a record
pub fn open(record: &EncryptedRecord) -> Result<Message, CodecError> {
    let ciphertext = record.ciphertext_bytes()?;
    open_ciphertext(&ciphertext, &record.sender, &record.recipient)
}
