//! Directory resolver: identifier ↔ owning address.
//!
//! The directory is an external collaborator (a contract behind a network
//! round trip). This module defines the interface the mail layer consumes
//! plus the policy around it:
//!
//! - **Sentinels**: the directory answers "unregistered" with the zero address
//!   or an empty string; [`lookup_owner`] / [`lookup_identifier`] turn those
//!   into [`ResolveError::NotRegistered`]
//! - **Bounded wait**: every lookup runs under a timeout and is not retried;
//!   expiry is [`ResolveError::Timeout`]
//! - **Superseding checks**: [`RecipientProbe`] debounces as-you-type recipient
//!   checks, and a newer check makes any in-flight one report `Superseded`
//!
//! Execution is single-threaded (one browser tab), so the trait is `?Send`.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::FeeSchedule;
use crate::identifier::{Address, Identifier};

/// Error reported by a directory backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("directory rejected the call: {0}")]
    Rejected(String),
    #[error("directory unreachable: {0}")]
    Unreachable(String),
}

/// Outcome of a bounded directory lookup
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("directory call timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0} is not registered")]
    NotRegistered(String),
    #[error(transparent)]
    Backend(#[from] DirectoryError),
}

/// Directory interface
///
/// Lookups return the raw sentinel answers; callers go through
/// [`lookup_owner`] / [`lookup_identifier`] for timeout and sentinel handling.
#[async_trait(?Send)]
pub trait DirectoryResolver {
    /// Owner of `identifier`, [`Address::ZERO`] if unregistered
    async fn resolve_owner(&self, identifier: &Identifier) -> Result<Address, DirectoryError>;

    /// Identifier owned by `owner`, empty string if none
    async fn resolve_identifier(&self, owner: &Address) -> Result<String, DirectoryError>;

    /// Register `identifier` for the connected account, paying `fee_wei`
    async fn register(&self, identifier: &Identifier, fee_wei: u128) -> Result<(), DirectoryError>;

    /// Anchor a content digest for `recipient`, paying `fee_wei`
    async fn record_digest(
        &self,
        recipient: &Identifier,
        digest: &str,
        fee_wei: u128,
    ) -> Result<(), DirectoryError>;
}

/// Run a directory call under a bounded wait
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, ResolveError>
where
    F: Future<Output = Result<T, DirectoryError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(ResolveError::from),
        Err(_) => {
            warn!(?limit, "directory call timed out");
            Err(ResolveError::Timeout(limit))
        }
    }
}

/// Resolve the owner of `identifier`; the zero address is `NotRegistered`
pub async fn lookup_owner<D: DirectoryResolver + ?Sized>(
    directory: &D,
    identifier: &Identifier,
    limit: Duration,
) -> Result<Address, ResolveError> {
    let owner = with_timeout(limit, directory.resolve_owner(identifier)).await?;
    if owner.is_zero() {
        return Err(ResolveError::NotRegistered(identifier.to_string()));
    }
    debug!(%identifier, owner = %owner.short(), "resolved owner");
    Ok(owner)
}

/// Resolve the identifier owned by `owner`; empty is `NotRegistered`
pub async fn lookup_identifier<D: DirectoryResolver + ?Sized>(
    directory: &D,
    owner: &Address,
    limit: Duration,
) -> Result<Identifier, ResolveError> {
    let raw = with_timeout(limit, directory.resolve_identifier(owner)).await?;
    if raw.is_empty() {
        return Err(ResolveError::NotRegistered(owner.to_string()));
    }
    Identifier::parse(&raw).map_err(|e| {
        ResolveError::Backend(DirectoryError::Rejected(format!(
            "directory returned invalid identifier {:?}: {}",
            raw, e
        )))
    })
}

// ============================================================
// RECIPIENT PROBE
// ============================================================

/// Result of a recipient check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Input is not a plausible identifier; nothing was looked up
    Unchecked,
    /// Recipient exists
    Registered(Address),
    /// Directory answered "unregistered"
    NotRegistered,
    /// Lookup timed out or the backend failed
    Failed(ResolveError),
    /// A newer check started before this one finished
    Superseded,
}

/// Debounced recipient-existence check with a single outstanding request
///
/// Each call to [`RecipientProbe::check`] bumps a generation counter. A call
/// that observes a newer generation after its debounce delay, or after its
/// lookup completes, reports [`ProbeOutcome::Superseded`] and its result is
/// discarded.
pub struct RecipientProbe<'a, D: DirectoryResolver + ?Sized> {
    directory: &'a D,
    debounce: Duration,
    limit: Duration,
    generation: Cell<u64>,
}

impl<'a, D: DirectoryResolver + ?Sized> RecipientProbe<'a, D> {
    pub fn new(directory: &'a D, debounce: Duration, limit: Duration) -> Self {
        Self {
            directory,
            debounce,
            limit,
            generation: Cell::new(0),
        }
    }

    /// Supersede any in-flight check without starting a new one
    pub fn cancel(&self) {
        self.generation.set(self.generation.get().wrapping_add(1));
    }

    /// Check whether `input` names a registered recipient
    pub async fn check(&self, input: &str) -> ProbeOutcome {
        self.cancel();
        let generation = self.generation.get();

        if !self.debounce.is_zero() {
            tokio::time::sleep(self.debounce).await;
        }
        if self.generation.get() != generation {
            return ProbeOutcome::Superseded;
        }

        if !Identifier::is_plausible(input) {
            return ProbeOutcome::Unchecked;
        }
        let Ok(identifier) = Identifier::parse(input) else {
            return ProbeOutcome::Unchecked;
        };

        let result = lookup_owner(self.directory, &identifier, self.limit).await;
        if self.generation.get() != generation {
            return ProbeOutcome::Superseded;
        }

        match result {
            Ok(owner) => ProbeOutcome::Registered(owner),
            Err(ResolveError::NotRegistered(_)) => ProbeOutcome::NotRegistered,
            Err(e) => ProbeOutcome::Failed(e),
        }
    }
}

// ============================================================
// IN-MEMORY DIRECTORY
// ============================================================

#[derive(Default)]
struct DirectoryState {
    owners: HashMap<String, Address>,
    identifiers: HashMap<Address, String>,
    digests: Vec<(String, String)>,
    owner_lookups: usize,
    latency: Duration,
    offline: bool,
}

/// In-memory directory for tests and demos
///
/// Applies the contract's registration rules: exact fee, one identifier per
/// address, one address per identifier. Uses Rc<RefCell<...>> so clones
/// share state; each clone may act as a different connected account.
#[derive(Clone)]
pub struct InMemoryDirectory {
    state: Rc<RefCell<DirectoryState>>,
    /// Account that `register` acts for
    account: Address,
    /// Fee `register` requires
    register_fee: u128,
    /// Fee `record_digest` requires
    send_fee: u128,
}

impl InMemoryDirectory {
    /// Directory charging `register_fee` and the default send fee
    #[must_use]
    pub fn new(account: Address, register_fee: u128) -> Self {
        Self {
            state: Rc::new(RefCell::new(DirectoryState::default())),
            account,
            register_fee,
            send_fee: FeeSchedule::default().send_wei,
        }
    }

    /// Require `send_fee` for every anchored digest
    #[must_use]
    pub fn with_send_fee(mut self, send_fee: u128) -> Self {
        self.send_fee = send_fee;
        self
    }

    /// Same directory, acting for another account
    #[must_use]
    pub fn connect(&self, account: Address) -> Self {
        Self {
            state: Rc::clone(&self.state),
            account,
            register_fee: self.register_fee,
            send_fee: self.send_fee,
        }
    }

    #[must_use]
    pub fn account(&self) -> Address {
        self.account
    }

    /// Seed a registration directly, bypassing fee and uniqueness rules
    pub fn insert(&self, identifier: &Identifier, owner: Address) {
        let mut state = self.state.borrow_mut();
        state.owners.insert(identifier.as_str().to_string(), owner);
        state.identifiers.insert(owner, identifier.as_str().to_string());
    }

    /// Delay applied to every call
    pub fn set_latency(&self, latency: Duration) {
        self.state.borrow_mut().latency = latency;
    }

    /// Make every call fail as unreachable
    pub fn set_offline(&self, offline: bool) {
        self.state.borrow_mut().offline = offline;
    }

    /// Number of `resolve_owner` calls made so far
    #[must_use]
    pub fn owner_lookups(&self) -> usize {
        self.state.borrow().owner_lookups
    }

    /// Digests recorded so far as (recipient, digest)
    #[must_use]
    pub fn recorded_digests(&self) -> Vec<(String, String)> {
        self.state.borrow().digests.clone()
    }

    async fn round_trip(&self) -> Result<(), DirectoryError> {
        let (latency, offline) = {
            let state = self.state.borrow();
            (state.latency, state.offline)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if offline {
            return Err(DirectoryError::Unreachable("network offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl DirectoryResolver for InMemoryDirectory {
    async fn resolve_owner(&self, identifier: &Identifier) -> Result<Address, DirectoryError> {
        self.state.borrow_mut().owner_lookups += 1;
        self.round_trip().await?;
        Ok(self
            .state
            .borrow()
            .owners
            .get(identifier.as_str())
            .copied()
            .unwrap_or(Address::ZERO))
    }

    async fn resolve_identifier(&self, owner: &Address) -> Result<String, DirectoryError> {
        self.round_trip().await?;
        Ok(self
            .state
            .borrow()
            .identifiers
            .get(owner)
            .cloned()
            .unwrap_or_default())
    }

    async fn register(&self, identifier: &Identifier, fee_wei: u128) -> Result<(), DirectoryError> {
        self.round_trip().await?;

        if fee_wei != self.register_fee {
            return Err(DirectoryError::Rejected("Must send exact registration fee".to_string()));
        }
        {
            let state = self.state.borrow();
            if state.owners.contains_key(identifier.as_str()) {
                return Err(DirectoryError::Rejected("Email already taken".to_string()));
            }
            if state.identifiers.contains_key(&self.account) {
                return Err(DirectoryError::Rejected("Sender already has an email".to_string()));
            }
        }
        self.insert(identifier, self.account);
        Ok(())
    }

    async fn record_digest(
        &self,
        recipient: &Identifier,
        digest: &str,
        fee_wei: u128,
    ) -> Result<(), DirectoryError> {
        self.round_trip().await?;
        if fee_wei != self.send_fee {
            return Err(DirectoryError::Rejected("Must send exact mail fee".to_string()));
        }
        self.state
            .borrow_mut()
            .digests
            .push((recipient.as_str().to_string(), digest.to_string()));
        Ok(())
    }
}
