//! Zamail Core - Off-chain mail sealing and local mail store
//!
//! This crate provides the confidentiality layer of the Zamail web mail
//! client. Mail content never goes on-chain; the chain only maps
//! `<name>@zamail.com` identifiers to account addresses. It uses:
//! - Canonical JSON encoding of each message (fixed field order)
//! - A per-pair key: Keccak-256(recipient ‖ sender)
//! - Repeating-key XOR over the canonical bytes
//! - A Keccak-256 content digest as the mail's public handle
//! - One append-only JSON collection in a key/value store
//!
//! The per-pair key is derivable by anyone who knows both identifiers. This
//! is obfuscation, not encryption; see [`crypto`].
//!
//! ## Architecture
//!
//! ```text
//! Compose form / JS host
//!     ↓ Draft (to, subject, body)
//! Mailer
//!     ├── DirectoryResolver (identifier ↔ address, bounded wait)
//!     ├── envelope::seal
//!     │     ├── codec::encode   → canonical bytes
//!     │     ├── crypto::digest  → "0x" + keccak hex
//!     │     └── crypto::obfuscate(derive_key(from, to))
//!     └── MailStore
//!           ↓ get_item/set_item on one key
//! StorageBackend (localStorage / files / memory)
//!     ↓
//! zamail_encrypted_mails: [{hash, ciphertext, timestamp, from, to}, ...]
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod backend;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod directory;
pub mod envelope;
pub mod identifier;
pub mod mailer;
pub mod store;

#[cfg(not(target_arch = "wasm32"))]
pub use backend::FileStorage;
pub use backend::{InMemoryStorage, StorageBackend, StorageError};
pub use codec::{decode, encode, encode_with_limits, CodecError, Message};
pub use config::{
    format_ether, FeeSchedule, Limits, MailConfig, Timeouts, DEFAULT_STORAGE_KEY,
};
pub use crypto::{
    deobfuscate, derive_key, digest, keccak256, obfuscate, MailKey, DIGEST_HEX_LEN, KEY_SIZE,
};
pub use directory::{
    lookup_identifier, lookup_owner, DirectoryError, DirectoryResolver, InMemoryDirectory,
    ProbeOutcome, RecipientProbe, ResolveError,
};
pub use envelope::{open, open_ciphertext, seal, seal_with_limits, SealedMail};
pub use identifier::{Address, Identifier, IdentifierError, MAIL_DOMAIN};
pub use mailer::{format_age, Draft, MailError, MailView, Mailer, SendReceipt};
pub use store::{EncryptedRecord, MailStore, StoreError};

#[cfg(feature = "wasm")]
mod wasm;

#[cfg(feature = "wasm")]
pub use wasm::*;
