//! Mail workflows over a store and a directory.
//!
//! Manages the user-facing flows:
//! - Register an identifier for the connected account
//! - Resolve the connected account's own identifier
//! - Send: validate → resolve recipient → seal → append → (optional) anchor
//! - Inbox / outbox: query the store and open each record
//!
//! # Ordering Guarantees
//!
//! - Every validation and the recipient lookup happen before the store is
//!   touched; a rejected send never leaves a partial record behind
//! - Persistence failures surface to the caller and are not retried
//! - Digest anchoring runs only after a successful append and its failure is
//!   logged, never returned

use tracing::{info, warn};

use crate::backend::StorageBackend;
use crate::codec::{CodecError, Message};
use crate::config::MailConfig;
use crate::directory::{
    lookup_identifier, lookup_owner, with_timeout, DirectoryResolver, RecipientProbe, ResolveError,
};
use crate::envelope::{open, seal_with_limits};
use crate::identifier::{Address, Identifier, IdentifierError};
use crate::store::{EncryptedRecord, MailStore, StoreError};

/// Error types for mail workflows
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MailError {
    #[error("missing {0}")]
    MissingField(&'static str),
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(#[from] IdentifierError),
    #[error("content error: {0}")]
    Content(#[from] CodecError),
    #[error("directory error: {0}")]
    Resolve(#[from] ResolveError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Mail being composed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Draft {
    /// Recipient as typed
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Draft {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Result of a successful send
///
/// Nothing is mined when digests are not anchored, so `block_number` is 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendReceipt {
    pub digest: String,
    pub block_number: u64,
    pub status: u8,
}

/// A mailbox entry as presented to the user
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MailView {
    /// Opened successfully
    Opened {
        digest: String,
        created_at: u64,
        message: Message,
    },
    /// Record exists but its content could not be recovered
    Undecryptable {
        digest: String,
        created_at: u64,
        sender: Identifier,
        recipient: Identifier,
        error: CodecError,
    },
}

impl MailView {
    /// Open a stored record, keeping it listable if that fails
    pub fn from_record(record: EncryptedRecord) -> Self {
        match open(&record) {
            Ok(message) => MailView::Opened {
                digest: record.digest,
                created_at: record.created_at,
                message,
            },
            Err(error) => {
                warn!(digest = %record.digest, %error, "failed to open mail");
                MailView::Undecryptable {
                    digest: record.digest,
                    created_at: record.created_at,
                    sender: record.sender,
                    recipient: record.recipient,
                    error,
                }
            }
        }
    }

    #[must_use]
    pub fn digest(&self) -> &str {
        match self {
            MailView::Opened { digest, .. } | MailView::Undecryptable { digest, .. } => digest,
        }
    }

    #[must_use]
    pub fn created_at(&self) -> u64 {
        match self {
            MailView::Opened { created_at, .. } | MailView::Undecryptable { created_at, .. } => {
                *created_at
            }
        }
    }

    #[must_use]
    pub fn sender(&self) -> &Identifier {
        match self {
            MailView::Opened { message, .. } => &message.sender,
            MailView::Undecryptable { sender, .. } => sender,
        }
    }

    /// Subject, or a placeholder when the content could not be opened
    #[must_use]
    pub fn subject(&self) -> &str {
        match self {
            MailView::Opened { message, .. } => &message.subject,
            MailView::Undecryptable { .. } => "Encrypted Mail",
        }
    }

    /// Body, or a placeholder when the content could not be opened
    #[must_use]
    pub fn body(&self) -> &str {
        match self {
            MailView::Opened { message, .. } => &message.body,
            MailView::Undecryptable { .. } => "Failed to decrypt content",
        }
    }
}

/// Relative age of a mail for list display
#[must_use]
pub fn format_age(now_ms: u64, then_ms: u64) -> String {
    let minutes = now_ms.saturating_sub(then_ms) / 60_000;
    let hours = minutes / 60;
    let days = hours / 24;

    if minutes < 1 {
        "Just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if hours < 24 {
        format!("{}h ago", hours)
    } else if days < 7 {
        format!("{}d ago", days)
    } else {
        format!("{}w ago", days / 7)
    }
}

/// Milliseconds since the Unix epoch from the system clock
#[must_use]
pub fn system_clock() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Mail workflows for one connected account
pub struct Mailer<B: StorageBackend, D: DirectoryResolver> {
    /// Local mail store
    store: MailStore<B>,
    /// Identifier directory
    directory: D,
    /// Configuration
    config: MailConfig,
    /// Millisecond clock used to timestamp sent mail
    clock: fn() -> u64,
}

impl<B: StorageBackend, D: DirectoryResolver> Mailer<B, D> {
    /// Create a mailer with default config
    pub fn new(backend: B, directory: D) -> Self {
        Self::with_config(backend, directory, MailConfig::default())
    }

    /// Create a mailer with custom configuration
    pub fn with_config(backend: B, directory: D, config: MailConfig) -> Self {
        let store = MailStore::new(backend, config.storage_key.clone());
        Self {
            store,
            directory,
            config,
            clock: system_clock,
        }
    }

    /// Replace the clock (tests, or hosts without a system clock)
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn store(&self) -> &MailStore<B> {
        &self.store
    }

    #[must_use]
    pub fn directory(&self) -> &D {
        &self.directory
    }

    #[must_use]
    pub fn config(&self) -> &MailConfig {
        &self.config
    }

    /// Register `name` (normalised to `<name>@zamail.com`) for the connected account
    pub async fn register(&self, name: &str) -> Result<Identifier, MailError> {
        let identifier = Identifier::from_local_part(name)?;
        with_timeout(
            self.config.timeouts.confirm(),
            self.directory.register(&identifier, self.config.fees.register_wei),
        )
        .await?;
        info!(%identifier, "registered identifier");
        Ok(identifier)
    }

    /// Identifier registered by `account`
    pub async fn my_identifier(&self, account: &Address) -> Result<Identifier, MailError> {
        Ok(lookup_identifier(&self.directory, account, self.config.timeouts.resolve()).await?)
    }

    /// As-you-type recipient check using the configured debounce and lookup wait
    #[must_use]
    pub fn recipient_probe(&self) -> RecipientProbe<'_, D> {
        RecipientProbe::new(
            &self.directory,
            self.config.timeouts.debounce(),
            self.config.timeouts.resolve(),
        )
    }

    /// Seal and store a mail from `sender`
    ///
    /// Rejected before any write when a field is empty, the recipient is
    /// malformed or unregistered, the lookup times out, or the content
    /// exceeds the limits.
    pub async fn send(&mut self, sender: &Identifier, draft: &Draft) -> Result<SendReceipt, MailError> {
        if draft.to.trim().is_empty() {
            return Err(MailError::MissingField("recipient"));
        }
        if draft.subject.trim().is_empty() {
            return Err(MailError::MissingField("subject"));
        }
        if draft.body.trim().is_empty() {
            return Err(MailError::MissingField("body"));
        }

        let recipient = Identifier::parse(draft.to.trim())?;
        lookup_owner(&self.directory, &recipient, self.config.timeouts.resolve()).await?;

        let created_at = (self.clock)();
        let message = Message::new(
            sender.clone(),
            recipient.clone(),
            draft.subject.clone(),
            draft.body.clone(),
            created_at,
        );
        let sealed = seal_with_limits(&message, &self.config.limits)?;
        let digest = sealed.digest.clone();

        self.store
            .append(sealed.into_record(sender.clone(), recipient.clone(), created_at))?;
        info!(%digest, from = %sender, to = %recipient, "mail stored off-chain");

        if self.config.anchor_digests {
            let anchored = with_timeout(
                self.config.timeouts.confirm(),
                self.directory
                    .record_digest(&recipient, &digest, self.config.fees.send_wei),
            )
            .await;
            if let Err(e) = anchored {
                warn!(%digest, error = %e, "failed to anchor digest");
            }
        }

        Ok(SendReceipt {
            digest,
            block_number: 0,
            status: 1,
        })
    }

    /// Mail addressed to `me`, oldest first
    #[must_use]
    pub fn inbox(&self, me: &Identifier) -> Vec<MailView> {
        self.store
            .query_by_recipient(me)
            .into_iter()
            .map(MailView::from_record)
            .collect()
    }

    /// Mail sent by `me`, oldest first
    #[must_use]
    pub fn outbox(&self, me: &Identifier) -> Vec<MailView> {
        self.store
            .query_by_sender(me)
            .into_iter()
            .map(MailView::from_record)
            .collect()
    }

    /// Open a single mail by digest
    #[must_use]
    pub fn open_by_digest(&self, digest: &str) -> Option<MailView> {
        self.store.find_by_digest(digest).map(MailView::from_record)
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryStorage;
    use crate::config::FeeSchedule;
    use crate::directory::InMemoryDirectory;
    use std::time::Duration;

    const FEE: u128 = 1_000_000_000_000_000;

    fn id(s: &str) -> Identifier {
        Identifier::parse(s).unwrap()
    }

    fn fixed_clock() -> u64 {
        1_700_000_000_000
    }

    fn setup() -> (InMemoryStorage, Mailer<InMemoryStorage, InMemoryDirectory>) {
        let storage = InMemoryStorage::new();
        let directory = InMemoryDirectory::new(Address::new([1; 20]), FEE);
        directory.insert(&id("alice@zamail.com"), Address::new([1; 20]));
        directory.insert(&id("bob@zamail.com"), Address::new([2; 20]));
        let mailer = Mailer::new(storage.clone(), directory).with_clock(fixed_clock);
        (storage, mailer)
    }

    #[tokio::test]
    async fn test_send_and_read_back() {
        let (_, mut mailer) = setup();
        let alice = id("alice@zamail.com");

        let receipt = mailer
            .send(&alice, &Draft::new("bob@zamail.com", "Hi", "Hello"))
            .await
            .unwrap();
        assert_eq!(receipt.block_number, 0);
        assert_eq!(receipt.status, 1);

        let inbox = mailer.inbox(&id("bob@zamail.com"));
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].digest(), receipt.digest);
        assert_eq!(inbox[0].subject(), "Hi");
        assert_eq!(inbox[0].body(), "Hello");
        assert_eq!(inbox[0].sender(), &alice);
        assert_eq!(inbox[0].created_at(), fixed_clock());

        assert_eq!(mailer.outbox(&alice).len(), 1);
        assert!(mailer.outbox(&id("bob@zamail.com")).is_empty());
    }

    #[tokio::test]
    async fn test_missing_fields_rejected() {
        let (_, mut mailer) = setup();
        let alice = id("alice@zamail.com");

        for (draft, field) in [
            (Draft::new("", "s", "b"), "recipient"),
            (Draft::new("bob@zamail.com", " ", "b"), "subject"),
            (Draft::new("bob@zamail.com", "s", ""), "body"),
        ] {
            assert_eq!(
                mailer.send(&alice, &draft).await,
                Err(MailError::MissingField(field))
            );
        }
        assert_eq!(mailer.directory().owner_lookups(), 0);
        assert!(mailer.store().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_recipient_skips_lookup() {
        let (_, mut mailer) = setup();
        let result = mailer
            .send(&id("alice@zamail.com"), &Draft::new("bob@gmail.com", "s", "b"))
            .await;
        assert_eq!(
            result,
            Err(MailError::InvalidIdentifier(IdentifierError::WrongDomain))
        );
        assert_eq!(mailer.directory().owner_lookups(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_timeout_blocks_send() {
        let (storage, mut mailer) = setup();
        mailer.directory().set_latency(Duration::from_secs(60));

        let result = mailer
            .send(&id("alice@zamail.com"), &Draft::new("bob@zamail.com", "s", "b"))
            .await;
        assert!(matches!(result, Err(MailError::Resolve(ResolveError::Timeout(_)))));
        assert_eq!(storage.write_count(&mailer.config().storage_key), 0);
    }

    #[tokio::test]
    async fn test_oversized_body_rejected_before_write() {
        let (_, mut mailer) = setup();
        let result = mailer
            .send(
                &id("alice@zamail.com"),
                &Draft::new("bob@zamail.com", "s", "x".repeat(5001)),
            )
            .await;
        assert!(matches!(result, Err(MailError::Content(CodecError::BodyTooLong { .. }))));
        assert!(mailer.store().is_empty());
    }

    #[tokio::test]
    async fn test_anchoring_is_opt_in() {
        let (_, mut mailer) = setup();
        let alice = id("alice@zamail.com");
        mailer
            .send(&alice, &Draft::new("bob@zamail.com", "s", "b"))
            .await
            .unwrap();
        assert!(mailer.directory().recorded_digests().is_empty());

        let storage = InMemoryStorage::new();
        let directory = mailer.directory().clone();
        let config = MailConfig {
            anchor_digests: true,
            ..MailConfig::default()
        };
        let mut anchoring = Mailer::with_config(storage, directory, config);
        let receipt = anchoring
            .send(&alice, &Draft::new("bob@zamail.com", "s", "b"))
            .await
            .unwrap();
        assert_eq!(
            anchoring.directory().recorded_digests(),
            vec![("bob@zamail.com".to_string(), receipt.digest)]
        );
    }

    #[tokio::test]
    async fn test_anchoring_pays_configured_send_fee() {
        let (_, mailer) = setup();
        let alice = id("alice@zamail.com");
        let directory = mailer.directory().clone().with_send_fee(FEE / 10);

        let config = MailConfig {
            anchor_digests: true,
            fees: FeeSchedule {
                register_wei: FEE,
                send_wei: FEE / 10,
            },
            ..MailConfig::default()
        };
        let mut paying = Mailer::with_config(InMemoryStorage::new(), directory.clone(), config);
        let receipt = paying
            .send(&alice, &Draft::new("bob@zamail.com", "s", "b"))
            .await
            .unwrap();
        assert_eq!(
            directory.recorded_digests(),
            vec![("bob@zamail.com".to_string(), receipt.digest)]
        );

        // Default send fee does not match this directory: mail is stored, digest is not anchored
        let config = MailConfig {
            anchor_digests: true,
            ..MailConfig::default()
        };
        let mut underpaying = Mailer::with_config(InMemoryStorage::new(), directory.clone(), config);
        underpaying
            .send(&alice, &Draft::new("bob@zamail.com", "s", "again"))
            .await
            .unwrap();
        assert_eq!(underpaying.store().len(), 1);
        assert_eq!(directory.recorded_digests().len(), 1);
    }

    #[tokio::test]
    async fn test_register_and_identify() {
        let storage = InMemoryStorage::new();
        let account = Address::new([7; 20]);
        let directory = InMemoryDirectory::new(account, FEE);
        let mailer = Mailer::new(storage, directory);

        assert!(matches!(
            mailer.my_identifier(&account).await,
            Err(MailError::Resolve(ResolveError::NotRegistered(_)))
        ));

        let registered = mailer.register("Carol.99").await.unwrap();
        assert_eq!(registered.as_str(), "carol99@zamail.com");
        assert_eq!(mailer.my_identifier(&account).await.unwrap(), registered);
    }

    #[test]
    fn test_undecryptable_record_is_listed() {
        let (_, mut mailer) = setup();
        let bob = id("bob@zamail.com");
        mailer
            .store
            .append(EncryptedRecord {
                digest: "0xfeed".to_string(),
                ciphertext: "0x0102030405".to_string(),
                created_at: 5,
                sender: id("alice@zamail.com"),
                recipient: bob.clone(),
            })
            .unwrap();

        let inbox = mailer.inbox(&bob);
        assert_eq!(inbox.len(), 1);
        assert!(matches!(inbox[0], MailView::Undecryptable { .. }));
        assert_eq!(inbox[0].subject(), "Encrypted Mail");
        assert_eq!(inbox[0].body(), "Failed to decrypt content");
        assert_eq!(inbox[0].sender(), &id("alice@zamail.com"));
        assert!(mailer.open_by_digest("0xfeed").is_some());
    }

    #[test]
    fn test_format_age() {
        let now = 10 * 24 * 3_600_000;
        assert_eq!(format_age(now, now - 30_000), "Just now");
        assert_eq!(format_age(now, now - 5 * 60_000), "5m ago");
        assert_eq!(format_age(now, now - 3 * 3_600_000), "3h ago");
        assert_eq!(format_age(now, now - 2 * 24 * 3_600_000), "2d ago");
        assert_eq!(format_age(now, now - 8 * 24 * 3_600_000), "1w ago");
        // Clock skew never underflows
        assert_eq!(format_age(now, now + 1000), "Just now");
    }
}
