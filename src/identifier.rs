//! Mailbox identifiers and account addresses.
//!
//! An [`Identifier`] is the `local@zamail.com` string a wallet registers with
//! the directory. An [`Address`] is the 20-byte account that owns it; the
//! all-zero address is the directory's "unregistered" answer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Fixed mail domain
pub const MAIL_DOMAIN: &str = "zamail.com";

/// Minimum identifier length (whole string)
pub const IDENTIFIER_MIN_LEN: usize = 3;

/// Maximum identifier length (whole string)
pub const IDENTIFIER_MAX_LEN: usize = 50;

/// Address length in bytes
pub const ADDRESS_LEN: usize = 20;

/// Error types for identifier and address parsing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("identifier must be {min}-{max} characters, got {len}")]
    Length { len: usize, min: usize, max: usize },
    #[error("identifier must end with @zamail.com")]
    WrongDomain,
    #[error("local part must be non-empty and alphanumeric")]
    InvalidLocalPart,
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// A validated `<local-part>@zamail.com` mailbox identifier
///
/// Case is preserved as typed; use [`Identifier::matches`] for the
/// case-insensitive comparison mailbox queries need.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Validate an identifier against `^[a-zA-Z0-9]+@zamail\.com$`, 3-50 chars
    pub fn parse(input: &str) -> Result<Self, IdentifierError> {
        let len = input.chars().count();
        if !(IDENTIFIER_MIN_LEN..=IDENTIFIER_MAX_LEN).contains(&len) {
            return Err(IdentifierError::Length {
                len,
                min: IDENTIFIER_MIN_LEN,
                max: IDENTIFIER_MAX_LEN,
            });
        }

        let (local, domain) = input
            .rsplit_once('@')
            .ok_or(IdentifierError::WrongDomain)?;
        if domain != MAIL_DOMAIN {
            return Err(IdentifierError::WrongDomain);
        }
        if local.is_empty() || !local.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(IdentifierError::InvalidLocalPart);
        }

        Ok(Self(input.to_string()))
    }

    /// Build an identifier from a user-typed name
    ///
    /// Lowercases, drops every non-alphanumeric character and appends the
    /// mail domain, the same normalisation the registration form applies.
    pub fn from_local_part(input: &str) -> Result<Self, IdentifierError> {
        let local: String = input
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_lowercase())
            .collect();
        if local.is_empty() {
            return Err(IdentifierError::InvalidLocalPart);
        }
        Self::parse(&format!("{}@{}", local, MAIL_DOMAIN))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn local_part(&self) -> &str {
        self.0.rsplit_once('@').map_or(self.0.as_str(), |(local, _)| local)
    }

    /// Case-insensitive equality
    #[must_use]
    pub fn matches(&self, other: &Identifier) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }

    /// Cheap plausibility check used before issuing a directory lookup
    #[must_use]
    pub fn is_plausible(input: &str) -> bool {
        input.len() >= 5 && input.ends_with(&format!("@{}", MAIL_DOMAIN))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

/// A 20-byte account address
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// The "unregistered" sentinel
    pub const ZERO: Self = Self([0u8; ADDRESS_LEN]);

    #[must_use]
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse `0x`-prefixed (or bare) hex
    pub fn parse(input: &str) -> Result<Self, IdentifierError> {
        let digits = input.strip_prefix("0x").unwrap_or(input);
        let bytes = hex::decode(digits)
            .map_err(|_| IdentifierError::InvalidAddress(input.to_string()))?;
        let bytes: [u8; ADDRESS_LEN] = bytes
            .try_into()
            .map_err(|_| IdentifierError::InvalidAddress(input.to_string()))?;
        Ok(Self(bytes))
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LEN]
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Abbreviated form for display, e.g. `0x1234...abcd`
    #[must_use]
    pub fn short(&self) -> String {
        let full = self.to_string();
        format!("{}...{}", &full[..6], &full[full.len() - 4..])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
