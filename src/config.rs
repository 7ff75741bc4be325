//! Mail configuration
//!
//! Content limits, lookup timeouts, fee schedule and the storage key used
//! for the persisted mail collection. Every field has a default so the host
//! page can pass a partial JSON object.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Storage key of the persisted mail collection
pub const DEFAULT_STORAGE_KEY: &str = "zamail_encrypted_mails";

/// Wei per ether
const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

/// Content size limits, counted in characters
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum subject length
    pub subject_max: usize,
    /// Maximum body length
    pub body_max: usize,
    /// Maximum length of the canonical encoded message
    pub message_max: usize,
}

impl Limits {
    /// Limits enforced by the deployed front end
    pub const STANDARD: Self = Self {
        subject_max: 200,
        body_max: 5000,
        message_max: 10_000,
    };
}

impl Default for Limits {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Bounded waits for directory calls, in milliseconds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Owner/identifier lookups
    pub resolve_ms: u64,
    /// Registration and other confirmed transactions
    pub confirm_ms: u64,
    /// Quiet period before a recipient check is issued
    pub debounce_ms: u64,
}

impl Timeouts {
    /// Production values (15s lookups, 30s confirmation, 500ms debounce)
    pub const PROD: Self = Self {
        resolve_ms: 15_000,
        confirm_ms: 30_000,
        debounce_ms: 500,
    };

    /// Test values
    pub const TEST: Self = Self {
        resolve_ms: 200,
        confirm_ms: 400,
        debounce_ms: 20,
    };

    #[must_use]
    pub fn resolve(&self) -> Duration {
        Duration::from_millis(self.resolve_ms)
    }

    #[must_use]
    pub fn confirm(&self) -> Duration {
        Duration::from_millis(self.confirm_ms)
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        #[cfg(any(test, feature = "test-constants"))]
        { Self::TEST }
        #[cfg(not(any(test, feature = "test-constants")))]
        { Self::PROD }
    }
}

/// Directory fees in wei
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    /// Fee for registering an identifier (0.001 ETH)
    pub register_wei: u128,
    /// Fee for anchoring a sent mail (0.0001 ETH)
    pub send_wei: u128,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            register_wei: 1_000_000_000_000_000,
            send_wei: 100_000_000_000_000,
        }
    }
}

/// Top-level configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub limits: Limits,
    pub timeouts: Timeouts,
    pub fees: FeeSchedule,
    /// Key of the persisted collection in the storage backend
    pub storage_key: String,
    /// Record each sent digest with the directory after a successful append.
    /// Off by default: the deployed contract rejects hash-only sends.
    pub anchor_digests: bool,
}

impl MailConfig {
    /// Create config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a (possibly partial) JSON config
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            timeouts: Timeouts::default(),
            fees: FeeSchedule::default(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            anchor_digests: false,
        }
    }
}

/// Render a wei amount in ether, trimming trailing zeros ("0.001")
#[must_use]
pub fn format_ether(wei: u128) -> String {
    let whole = wei / WEI_PER_ETHER;
    let frac = wei % WEI_PER_ETHER;
    if frac == 0 {
        return format!("{}.0", whole);
    }
    let digits = format!("{:018}", frac);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}
