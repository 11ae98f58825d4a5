// zm-broker-core/src/fingerprint.rs
// ============================================================================
// Module: Fingerprinter (C2)
// Description: Deterministic 64-bit identifier derivation over the
//              semantically significant subset of test params.
// Purpose: Give create_test a stable reuse key independent of submission
//          order, client metadata, or dispatch hints.
// Dependencies: md-5, serde, serde_jcs
// ============================================================================

//! ## Overview
//! The legacy column backing this value was renamed from
//! `params_deterministic_hash` to `fingerprint`; callers should use
//! `fingerprint` exclusively (§9).

use md5::Digest;
use md5::Md5;
use serde::Serialize;

use crate::error::BrokerError;
use crate::ids::TestId;
use crate::params::DsInfo;
use crate::params::NameServer;
use crate::params::TestParams;

/// The 64-bit fingerprint of a normalized test submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Returns the raw 64-bit value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Returns the test id derived from this fingerprint (§3, §4.2).
    #[must_use]
    pub fn test_id(self) -> TestId {
        TestId::from_fingerprint(self.0)
    }
}

/// The subset of [`TestParams`] that participates in the fingerprint.
/// `client_id`, `client_version`, `priority`, `queue`, and `language` are
/// deliberately excluded (§4.2).
#[derive(Serialize)]
struct FingerprintInput<'a> {
    domain: &'a str,
    ipv4: bool,
    ipv6: bool,
    profile: &'a str,
    nameservers: &'a [NameServer],
    ds_info: &'a [DsInfo],
}

/// Computes the fingerprint of a normalized, canonically ordered
/// [`TestParams`]. Callers must call [`TestParams::canonicalize_order`]
/// first so that permutations of `nameservers`/`ds_info` hash identically
/// (testable property 1).
pub fn fingerprint(params: &TestParams) -> Result<Fingerprint, BrokerError> {
    let input = FingerprintInput {
        domain: &params.domain,
        ipv4: params.ipv4,
        ipv6: params.ipv6,
        profile: &params.profile,
        nameservers: &params.nameservers,
        ds_info: &params.ds_info,
    };
    let canonical = serde_jcs::to_vec(&input)
        .map_err(|err| BrokerError::internal(format!("failed to canonicalize params: {err}")))?;
    let mut hasher = Md5::new();
    hasher.update(&canonical);
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    Ok(Fingerprint(u64::from_be_bytes(bytes)))
}
