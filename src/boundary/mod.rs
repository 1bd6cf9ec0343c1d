//! External collaborator boundaries.
//!
//! Rate limiting fails open; claim authorization fails closed.

mod claims;
mod rate_limit;

pub use claims::{authorize_claim, ClaimAuthority, ClaimDecision, DenyReason, SignedClaim};
pub use rate_limit::{
    check_fail_open, FixedWindowLimiter, RateDecision, RateLimitConfig, RateLimiter,
};
