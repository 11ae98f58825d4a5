// zm-broker-core/src/params.rs
// ============================================================================
// Module: Test Parameters
// Description: The shape of a start_domain_test submission, before and
//              after normalization (§3, §4.2).
// Purpose: One canonical representation that both the validator and the
//          fingerprinter agree on.
// Dependencies: serde, serde_json
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

/// A name server entry, `{ns: domain, ip?: ip}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NameServer {
    /// IDNA-encoded, lowercased name server domain.
    pub ns: String,
    /// Canonicalized IP address, if supplied.
    pub ip: Option<String>,
}

/// A DS record entry, `{digest, algorithm, digtype, keytag}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DsInfo {
    /// Key tag (sorted on first, per §4.2).
    pub keytag: u16,
    /// DNSKEY algorithm number.
    pub algorithm: u8,
    /// Digest type.
    pub digtype: u8,
    /// Lowercase hex digest, 40, 64, or 96 characters.
    pub digest: String,
}

/// Normalized, fully defaulted test parameters as stored and returned by
/// `get_test_params` / `get_test_results` (§4.5 "Normalization on the way
/// out").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestParams {
    /// IDNA-encoded, lowercased domain (trailing dot stripped unless root).
    pub domain: String,
    /// Whether to test over IPv4.
    #[serde(default)]
    pub ipv4: bool,
    /// Whether to test over IPv6.
    #[serde(default)]
    pub ipv6: bool,
    /// Canonically sorted name servers.
    #[serde(default)]
    pub nameservers: Vec<NameServer>,
    /// Canonically sorted DS records.
    #[serde(default)]
    pub ds_info: Vec<DsInfo>,
    /// Lowercased, pre-registered profile name.
    pub profile: String,
    /// Opaque client identifier, not part of the fingerprint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Opaque client version, not part of the fingerprint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_version: Option<String>,
    /// Dispatch priority, higher runs sooner.
    pub priority: i32,
    /// Dispatch queue tag.
    pub queue: i32,
    /// Requested response language, not part of the fingerprint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl TestParams {
    /// The `undelegated` flag: true iff `nameservers` or `ds_info`
    /// contained at least one entry at creation time (§3 invariant 6).
    #[must_use]
    pub fn undelegated(&self) -> bool {
        !self.nameservers.is_empty() || !self.ds_info.is_empty()
    }

    /// Sorts `nameservers` by `(ns, ip)` and `ds_info` by
    /// `(keytag, algorithm, digtype, digest)`, as required for fingerprint
    /// stability under permutation (§4.2, testable property 1).
    pub fn canonicalize_order(&mut self) {
        self.nameservers.sort();
        self.ds_info.sort();
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

    fn base_params() -> TestParams {
        TestParams {
            domain: "zonemaster.net".to_string(),
            ipv4: true,
            ipv6: true,
            nameservers: vec![],
            ds_info: vec![],
            profile: "default".to_string(),
            client_id: None,
            client_version: None,
            priority: 10,
            queue: 0,
            language: None,
        }
    }

    #[test]
    fn undelegated_is_false_with_no_extra_data() {
        assert!(!base_params().undelegated());
    }

    #[test]
    fn undelegated_is_true_with_nameservers() {
        let mut p = base_params();
        p.nameservers.push(NameServer { ns: "ns1.example.".to_string(), ip: None });
        assert!(p.undelegated());
    }

    #[test]
    fn undelegated_is_true_with_ds_info() {
        let mut p = base_params();
        p.ds_info.push(DsInfo { keytag: 1, algorithm: 8, digtype: 2, digest: "a".repeat(64) });
        assert!(p.undelegated());
    }

    #[test]
    fn canonicalize_order_sorts_nameservers_and_ds_info() {
        let mut p = base_params();
        p.nameservers = vec![
            NameServer { ns: "ns2.example.".to_string(), ip: None },
            NameServer { ns: "ns1.example.".to_string(), ip: None },
        ];
        p.ds_info = vec![
            DsInfo { keytag: 2, algorithm: 8, digtype: 2, digest: "b".repeat(64) },
            DsInfo { keytag: 1, algorithm: 8, digtype: 2, digest: "a".repeat(64) },
        ];
        p.canonicalize_order();
        assert_eq!(p.nameservers[0].ns, "ns1.example.");
        assert_eq!(p.ds_info[0].keytag, 1);
    }
}
