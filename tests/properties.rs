//! Property-based tests for the sealing pipeline and the mail store.
//!
//! These tests verify:
//!
//! - Canonical encoding round-trips every valid message
//! - Obfuscation is an involution and preserves length
//! - Digests are deterministic and separate distinct inputs
//! - Key derivation depends on argument order
//! - Store queries return exactly the matching records

use proptest::prelude::*;

use zamail_core::{
    decode, deobfuscate, derive_key, digest, encode, obfuscate, open, seal, EncryptedRecord,
    Identifier, InMemoryStorage, MailStore, Message, DIGEST_HEX_LEN, DEFAULT_STORAGE_KEY,
};

fn identifier() -> impl Strategy<Value = Identifier> {
    "[a-zA-Z0-9]{1,30}".prop_map(|local| Identifier::parse(&format!("{}@zamail.com", local)).unwrap())
}

fn message() -> impl Strategy<Value = Message> {
    (identifier(), identifier(), ".{0,200}", ".{0,500}", any::<u64>())
        .prop_map(|(from, to, subject, body, ts)| Message::new(from, to, subject, body, ts))
}

// ==================== Codec ====================

proptest! {
    /// Every valid message survives encode then decode unchanged.
    #[test]
    fn encode_decode_roundtrip(m in message()) {
        let bytes = encode(&m).unwrap();
        prop_assert_eq!(decode(&bytes).unwrap(), m);
    }

    /// Sealed content opens back to the original for the same pair.
    #[test]
    fn seal_open_roundtrip(m in message()) {
        let sealed = seal(&m).unwrap();
        let record = sealed.into_record(m.sender.clone(), m.recipient.clone(), m.timestamp);
        prop_assert_eq!(open(&record).unwrap(), m);
    }
}

// ==================== Obfuscation ====================

proptest! {
    /// Applying the same key twice restores the input.
    #[test]
    fn obfuscation_is_involution(
        data in prop::collection::vec(any::<u8>(), 0..2048),
        key in prop::collection::vec(any::<u8>(), 1..64)
    ) {
        prop_assert_eq!(deobfuscate(&obfuscate(&data, &key), &key), data);
    }

    /// Output length always equals input length.
    #[test]
    fn obfuscation_preserves_length(
        data in prop::collection::vec(any::<u8>(), 0..2048),
        key in prop::collection::vec(any::<u8>(), 0..64)
    ) {
        prop_assert_eq!(obfuscate(&data, &key).len(), data.len());
    }
}

// ==================== Digest and keys ====================

proptest! {
    /// Same input, same digest; always 0x + 64 lowercase hex.
    #[test]
    fn digest_is_deterministic(data in prop::collection::vec(any::<u8>(), 0..1024)) {
        let (d, again) = (digest(&data), digest(&data));
        prop_assert_eq!(&d, &again);
        prop_assert_eq!(d.len(), DIGEST_HEX_LEN);
        prop_assert!(d.starts_with("0x"));
        prop_assert!(d[2..].chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    /// Distinct inputs give distinct digests.
    #[test]
    fn digest_separates_inputs(
        a in prop::collection::vec(any::<u8>(), 0..256),
        b in prop::collection::vec(any::<u8>(), 0..256)
    ) {
        prop_assume!(a != b);
        prop_assert_ne!(digest(&a), digest(&b));
    }

    /// Swapping sender and recipient gives a different key.
    #[test]
    fn key_derivation_is_order_sensitive(a in identifier(), b in identifier()) {
        prop_assume!(a != b);
        let (ab, ba) = (derive_key(&a, &b), derive_key(&b, &a));
        prop_assert_ne!(ab.as_bytes(), ba.as_bytes());
    }
}

// ==================== Store ====================

fn record_for(m: &Message) -> EncryptedRecord {
    seal(m)
        .unwrap()
        .into_record(m.sender.clone(), m.recipient.clone(), m.timestamp)
}

proptest! {
    /// An appended record is found by its recipient and by no other.
    #[test]
    fn query_by_recipient_finds_exactly_matching(
        m in message(),
        other in identifier(),
        earlier in prop::collection::vec(message(), 0..5)
    ) {
        prop_assume!(!m.recipient.matches(&other));

        let mut store = MailStore::new(InMemoryStorage::new(), DEFAULT_STORAGE_KEY);
        for e in &earlier {
            store.append(record_for(e)).unwrap();
        }
        let record = record_for(&m);
        store.append(record.clone()).unwrap();

        prop_assert!(store.query_by_recipient(&m.recipient).contains(&record));
        prop_assert!(!store.query_by_recipient(&other).contains(&record));
        prop_assert!(store.query_by_sender(&m.sender).contains(&record));
        prop_assert_eq!(store.len(), earlier.len() + 1);
    }
}
