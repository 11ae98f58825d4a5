// zm-broker-rpc/src/rewrite.rs
// ============================================================================
// Module: Legacy Result Rewriting
// Description: The two path-substitution rewrites and the POLICY_DISABLED
//              drop applied to get_test_results output.
// Purpose: Preserve documented legacy behavior verbatim (§4.5, §9) in one
//          place so dispatch.rs stays a plain pipeline.
// Dependencies: serde_json
// ============================================================================

use serde_json::Value;

/// `true` iff a result entry must be dropped entirely: module `SYSTEM`,
/// tag `POLICY_DISABLED`, and an `args.name` of `"Example"` (§4.5).
#[must_use]
pub fn is_dropped_system_example(module: &str, tag: &str, args: &Value) -> bool {
    module == "SYSTEM" && tag == "POLICY_DISABLED" && args.get("name").and_then(Value::as_str) == Some("Example")
}

/// Replaces any whitespace-delimited token mentioning `policy.json` or
/// `config.json` with a fixed human label (§4.5). This is legacy behavior
/// kept verbatim; it operates on the already-translated message.
#[must_use]
pub fn apply_legacy_rewrites(message: &str) -> String {
    let message = replace_path_mention(message, "policy.json", "the configured policy file");
    replace_path_mention(&message, "config.json", "the configured settings file")
}

fn replace_path_mention(message: &str, needle: &str, label: &str) -> String {
    message
        .split_whitespace()
        .map(|token| if token.contains(needle) { label } else { token })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_policy_disabled_entry_is_dropped() {
        assert!(is_dropped_system_example("SYSTEM", "POLICY_DISABLED", &serde_json::json!({ "name": "Example" })));
        assert!(!is_dropped_system_example("SYSTEM", "POLICY_DISABLED", &serde_json::json!({ "name": "Other" })));
        assert!(!is_dropped_system_example("NAMESERVER", "POLICY_DISABLED", &serde_json::json!({ "name": "Example" })));
    }

    #[test]
    fn policy_json_path_is_rewritten() {
        let rewritten = apply_legacy_rewrites("Policy loaded from /etc/zonemaster/policy.json successfully");
        assert!(rewritten.contains("the configured policy file"));
        assert!(!rewritten.contains("policy.json"));
    }

    #[test]
    fn config_json_path_is_rewritten() {
        let rewritten = apply_legacy_rewrites("Settings read from config.json");
        assert!(rewritten.contains("the configured settings file"));
    }

    #[test]
    fn unrelated_messages_pass_through_unchanged() {
        assert_eq!(apply_legacy_rewrites("Nameserver ns1 did not respond"), "Nameserver ns1 did not respond");
    }
}
