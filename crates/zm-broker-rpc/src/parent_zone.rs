// zm-broker-rpc/src/parent_zone.rs
// ============================================================================
// Module: Parent Zone Lookup Boundary
// Description: The external collaborator boundary for get_data_from_parent_zone.
// Purpose: Keep the DNS-protocol engine work spec §1 scopes out behind a
//          trait, mirroring the Translator adapter's own external-boundary
//          shape (§4.6).
// Dependencies: none
// ============================================================================

//! ## Overview
//! §1 scopes the DNS test engine itself out of this design — "what it
//! queries, what results it returns" is an external collaborator. Walking
//! the parent zone for NS/DS records is exactly that kind of protocol-level
//! work (it requires sending real DNS queries, not a convenience hostname
//! lookup), so [`ParentZoneLookup`] gives `dispatch.rs` a seam instead of a
//! hand-rolled resolver. [`StubParentZoneLookup`] is the default: it always
//! returns empty lists, documented in `DESIGN.md` as a deliberate scope
//! decision rather than an oversight.

/// The result of walking a domain's parent zone for delegation data.
#[derive(Debug, Clone, Default)]
pub struct ParentZoneResult {
    /// Name server hostnames found at the parent.
    pub ns_list: Vec<String>,
    /// DS record digests found at the parent.
    pub ds_list: Vec<String>,
}

/// External collaborator boundary for `get_data_from_parent_zone` (§6).
///
/// A real implementation queries the parent zone's authoritative servers
/// directly; that is DNS-test-engine work and is out of scope for this
/// design (§1).
pub trait ParentZoneLookup: Send + Sync {
    /// Looks up `domain`'s delegation data at its parent zone.
    fn lookup(&self, domain: &str) -> ParentZoneResult;
}

/// Default [`ParentZoneLookup`]: always returns empty lists.
pub struct StubParentZoneLookup;

impl ParentZoneLookup for StubParentZoneLookup {
    fn lookup(&self, _domain: &str) -> ParentZoneResult {
        ParentZoneResult::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_lookup_returns_empty_lists() {
        let result = StubParentZoneLookup.lookup("zonemaster.net");
        assert!(result.ns_list.is_empty());
        assert!(result.ds_list.is_empty());
    }
}
