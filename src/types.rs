//! Core types for the streak ledger.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_micros() as i64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Opaque session credential issued by the backend on connect.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(pub String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        SessionToken(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identity bound to this token.
    pub fn identity(&self) -> Identity {
        Identity::from_token(self)
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never log the credential itself.
        write!(f, "SessionToken({})", self.identity())
    }
}

/// Session identity (SHA-256 of the session token).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(pub [u8; 32]);

impl Identity {
    pub fn from_token(token: &SessionToken) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(token.0.as_bytes());
        Identity(hasher.finalize().into())
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Identity(arr))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Canonical key form of an address: trimmed and lower-cased.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

/// Optional profile metadata carried along with a report.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub fid: Option<i64>,
    pub display_name: Option<String>,
    pub username: Option<String>,
    pub pfp_url: Option<String>,
    pub primary_wallet: Option<String>,
}

impl Profile {
    /// Fields present in `newer` win; absent ones keep `self`.
    pub fn merged_with(&self, newer: &Profile) -> Profile {
        Profile {
            fid: newer.fid.or(self.fid),
            display_name: newer.display_name.clone().or_else(|| self.display_name.clone()),
            username: newer.username.clone().or_else(|| self.username.clone()),
            pfp_url: newer.pfp_url.clone().or_else(|| self.pfp_url.clone()),
            primary_wallet: newer
                .primary_wallet
                .clone()
                .or_else(|| self.primary_wallet.clone()),
        }
    }
}

/// Per-address streak record. Server-owned, replicated to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressStats {
    /// Normalized address (primary key).
    pub address: String,
    pub current_streak: u32,
    /// Historical maximum of `current_streak`.
    pub highest_streak: u32,
    /// Accepted reports ever.
    pub all_time_count: u64,
    /// Day index of the last accepted report. Never decreases.
    pub last_day: i64,
    pub last_tx_hash: Option<String>,
    pub profile: Profile,
    pub updated_at: Timestamp,
}

impl AddressStats {
    /// Zeroed record for an address with no accepted reports.
    pub fn zero(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            current_streak: 0,
            highest_streak: 0,
            all_time_count: 0,
            last_day: 0,
            last_tx_hash: None,
            profile: Profile::default(),
            updated_at: Timestamp::default(),
        }
    }
}

/// A client-submitted claim that `address` checked in on `day`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayReport {
    pub address: String,
    /// Day index; must be positive.
    pub day: i64,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub profile: Profile,
}

impl DayReport {
    pub fn new(address: impl Into<String>, day: i64) -> Self {
        Self {
            address: address.into(),
            day,
            tx_hash: None,
            profile: Profile::default(),
        }
    }

    pub fn with_tx_hash(mut self, tx_hash: impl Into<String>) -> Self {
        self.tx_hash = Some(tx_hash.into());
        self
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }
}
