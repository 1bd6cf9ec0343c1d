//! Claim-authorization boundary.
//!
//! Signing happens elsewhere. This side only asks for a signed payload and
//! decides whether it is usable, denying on any doubt.

use crate::error::Result;
use crate::types::{normalize_address, AddressStats, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Authorization issued by an external authority.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedClaim {
    pub address: String,
    /// Opaque payload the authority signed.
    pub payload: serde_json::Value,
    /// Hex-encoded signature.
    pub signature: String,
    /// Claim is void at or after this time.
    pub deadline: Timestamp,
}

impl SignedClaim {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.deadline
    }
}

pub trait ClaimAuthority: Send + Sync {
    fn authorize(&self, address: &str, stats: &AddressStats) -> Result<SignedClaim>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DenyReason {
    /// No accepted reports yet.
    NoActivity,
    AuthorityUnavailable(String),
    Expired,
    AddressMismatch,
    MissingSignature,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClaimDecision {
    Authorized(SignedClaim),
    Denied(DenyReason),
}

impl ClaimDecision {
    pub fn is_authorized(&self) -> bool {
        matches!(self, ClaimDecision::Authorized(_))
    }
}

/// Request a claim for `stats.address`. Every failure denies.
pub fn authorize_claim(
    authority: &dyn ClaimAuthority,
    stats: &AddressStats,
    now: Timestamp,
) -> ClaimDecision {
    if stats.all_time_count == 0 {
        return ClaimDecision::Denied(DenyReason::NoActivity);
    }

    let claim = match authority.authorize(&stats.address, stats) {
        Ok(claim) => claim,
        Err(e) => {
            warn!(address = %stats.address, error = %e, "claim authority unavailable, denying");
            return ClaimDecision::Denied(DenyReason::AuthorityUnavailable(e.to_string()));
        }
    };

    if normalize_address(&claim.address) != stats.address {
        warn!(address = %stats.address, claimed = %claim.address, "claim issued for another address");
        return ClaimDecision::Denied(DenyReason::AddressMismatch);
    }
    if claim.signature.trim().is_empty() {
        return ClaimDecision::Denied(DenyReason::MissingSignature);
    }
    if claim.is_expired(now) {
        return ClaimDecision::Denied(DenyReason::Expired);
    }

    ClaimDecision::Authorized(claim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use serde_json::json;

    struct FixedAuthority(Result<SignedClaim>);

    impl ClaimAuthority for FixedAuthority {
        fn authorize(&self, _address: &str, _stats: &AddressStats) -> Result<SignedClaim> {
            match &self.0 {
                Ok(claim) => Ok(claim.clone()),
                Err(e) => Err(LedgerError::Collaborator(e.to_string())),
            }
        }
    }

    fn active(address: &str) -> AddressStats {
        AddressStats {
            all_time_count: 3,
            ..AddressStats::zero(address)
        }
    }

    fn claim(address: &str, deadline: i64) -> SignedClaim {
        SignedClaim {
            address: address.into(),
            payload: json!({"amount": "1"}),
            signature: "0xabcdef".into(),
            deadline: Timestamp(deadline),
        }
    }

    #[test]
    fn test_authorized() {
        let authority = FixedAuthority(Ok(claim("0xA", 100)));
        let decision = authorize_claim(&authority, &active("0xa"), Timestamp(50));
        assert!(decision.is_authorized());
    }

    #[test]
    fn test_fail_closed_on_authority_error() {
        let authority = FixedAuthority(Err(LedgerError::Collaborator("timeout".into())));
        let decision = authorize_claim(&authority, &active("0xa"), Timestamp(50));
        assert!(matches!(
            decision,
            ClaimDecision::Denied(DenyReason::AuthorityUnavailable(_))
        ));
    }

    #[test]
    fn test_denies_expired_and_mismatched() {
        let expired = FixedAuthority(Ok(claim("0xa", 100)));
        assert_eq!(
            authorize_claim(&expired, &active("0xa"), Timestamp(100)),
            ClaimDecision::Denied(DenyReason::Expired)
        );

        let other = FixedAuthority(Ok(claim("0xb", 100)));
        assert_eq!(
            authorize_claim(&other, &active("0xa"), Timestamp(1)),
            ClaimDecision::Denied(DenyReason::AddressMismatch)
        );
    }

    #[test]
    fn test_denies_without_activity() {
        let authority = FixedAuthority(Ok(claim("0xa", 100)));
        assert_eq!(
            authorize_claim(&authority, &AddressStats::zero("0xa"), Timestamp(1)),
            ClaimDecision::Denied(DenyReason::NoActivity)
        );
    }
}
