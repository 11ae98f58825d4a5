// zm-broker-core/src/ids.rs
// ============================================================================
// Module: Identifiers
// Description: Canonical opaque identifiers for tests, batches, and users.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Test ids are the 16-character lowercase hex form of a 64-bit fingerprint
//! (see [`crate::fingerprint`]); batch ids and usernames are validated at
//! construction so that downstream code never has to re-check their shape.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::error::BrokerError;

/// 16-character lowercase hex test identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestId(String);

impl TestId {
    /// Builds a test id from a raw 64-bit fingerprint.
    #[must_use]
    pub fn from_fingerprint(fingerprint: u64) -> Self {
        Self(format!("{fingerprint:016x}"))
    }

    /// Parses a test id from its wire representation, rejecting anything
    /// that isn't exactly 16 lowercase hex characters.
    pub fn parse(raw: &str) -> Result<Self, BrokerError> {
        if raw.len() == 16 && raw.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
        {
            Ok(Self(raw.to_string()))
        } else {
            Err(BrokerError::user("/test_id", "Invalid test id"))
        }
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Strictly positive batch identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(i64);

impl BatchId {
    /// Wraps a raw batch id, requiring it to be strictly positive.
    pub fn new(raw: i64) -> Result<Self, BrokerError> {
        if raw > 0 {
            Ok(Self(raw))
        } else {
            Err(BrokerError::internal("batch id must be strictly positive"))
        }
    }

    /// Returns the raw integer value.
    #[must_use]
    pub fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Username matching `^[A-Za-z0-9.\-@]{1,50}$`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    /// Parses and validates a username per the spec's character class.
    pub fn parse(raw: &str) -> Result<Self, BrokerError> {
        let ok = !raw.is_empty()
            && raw.len() <= 50
            && raw.bytes().all(|b| {
                b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || b == b'@'
            });
        if ok {
            Ok(Self(raw.to_string()))
        } else {
            Err(BrokerError::user("/username", "Invalid username"))
        }
    }

    /// Returns the username as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Api key matching `^[A-Za-z0-9_\-]{1,512}$`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    /// Parses and validates an api key per the spec's character class.
    pub fn parse(raw: &str) -> Result<Self, BrokerError> {
        let ok = !raw.is_empty()
            && raw.len() <= 512
            && raw.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if ok {
            Ok(Self(raw.to_string()))
        } else {
            Err(BrokerError::user("/api_key", "Invalid api key"))
        }
    }

    /// Returns the api key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::*;

    #[test]
    fn test_id_round_trips_from_fingerprint() {
        let id = TestId::from_fingerprint(0x0123_4567_89ab_cdef);
        assert_eq!(id.as_str(), "0123456789abcdef");
        assert!(TestId::parse(id.as_str()).is_ok());
    }

    #[test]
    fn test_id_rejects_wrong_length_or_case() {
        assert!(TestId::parse("abc").is_err());
        assert!(TestId::parse("ABCDEF0123456789").is_err());
    }

    #[test]
    fn batch_id_rejects_non_positive() {
        assert!(BatchId::new(0).is_err());
        assert!(BatchId::new(-1).is_err());
        assert!(BatchId::new(1).is_ok());
    }

    #[test]
    fn username_accepts_spec_charset() {
        assert!(Username::parse("alice.smith-2@example").is_ok());
        assert!(Username::parse("alice smith").is_err());
        assert!(Username::parse(&"a".repeat(51)).is_err());
    }
}
