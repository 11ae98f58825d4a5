// zm-broker-core/src/domain.rs
// ============================================================================
// Module: Domain Name and IP Validation
// Description: The domain-name and IP-address rules from C1 (§4.1).
// Purpose: Isolate IDNA handling and character-class checks from the rest
//          of the validator so they can be unit tested in isolation.
// Dependencies: idna
// ============================================================================

use std::net::IpAddr;

/// Maximum total domain name length after IDNA conversion.
pub const MAX_DOMAIN_LENGTH: usize = 254;
/// Maximum length of a single domain label after IDNA conversion.
pub const MAX_LABEL_LENGTH: usize = 63;

/// Validates a submitted domain name per §4.1: length, per-label length
/// after IDNA A-label conversion, the singleton `.` root, and the
/// post-IDNA character set `[A-Za-z0-9.\-_]`.
///
/// Returns the IDNA-encoded (A-label) form on success.
pub fn validate_domain(raw: &str) -> Result<String, &'static str> {
    if raw == "." {
        return Ok(".".to_string());
    }
    let ascii = idna::domain_to_ascii(raw).map_err(|_| "The domain name could not be IDNA encoded")?;
    if ascii.len() > MAX_DOMAIN_LENGTH {
        return Err("The domain name is too long");
    }
    for label in ascii.split('.') {
        if label.len() > MAX_LABEL_LENGTH {
            return Err("The domain name has a label that is too long");
        }
    }
    if !ascii.bytes().all(|b| {
        b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || b == b'_'
    }) {
        return Err("The domain name character(s) are not supported");
    }
    Ok(ascii)
}

/// Normalizes an already-validated domain for fingerprinting: lowercase,
/// trailing dot stripped unless the name is the root singleton.
#[must_use]
pub fn normalize_domain(validated: &str) -> String {
    if validated == "." {
        return ".".to_string();
    }
    let lower = validated.to_ascii_lowercase();
    lower.strip_suffix('.').map_or_else(|| lower.clone(), ToString::to_string)
}

/// Validates an IP address: IPv4 dotted-decimal or IPv6 in any textual
/// form accepted by the standard library parser.
pub fn validate_ip(raw: &str) -> Result<IpAddr, &'static str> {
    raw.parse::<IpAddr>().map_err(|_| "The IP address is not valid")
}

/// Canonicalizes an IP address to its normalized textual form for
/// fingerprinting (lowercase, `std`'s canonical `Display` form).
#[must_use]
pub fn canonicalize_ip(ip: IpAddr) -> String {
    ip.to_string().to_ascii_lowercase()
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
    fn root_singleton_is_accepted() {
        assert_eq!(validate_domain(".").unwrap(), ".");
    }

    #[test]
    fn ordinary_domain_is_accepted() {
        assert_eq!(validate_domain("zonemaster.net").unwrap(), "zonemaster.net");
    }

    #[test]
    fn space_in_label_is_rejected() {
        assert!(validate_domain("ex ample.com").is_err());
    }

    #[test]
    fn too_long_label_is_rejected() {
        let label = "a".repeat(64);
        let name = format!("{label}.com");
        assert!(validate_domain(&name).is_err());
    }

    #[test]
    fn normalize_strips_trailing_dot_but_not_root() {
        assert_eq!(normalize_domain("Example.COM."), "example.com");
        assert_eq!(normalize_domain("."), ".");
    }

    #[test]
    fn ipv4_and_ipv6_are_accepted() {
        assert!(validate_ip("192.0.2.1").is_ok());
        assert!(validate_ip("2001:db8::1").is_ok());
        assert!(validate_ip("not-an-ip").is_err());
    }
}
