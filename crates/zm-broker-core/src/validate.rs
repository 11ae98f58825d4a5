// zm-broker-core/src/validate.rs
// ============================================================================
// Module: Validator (C1)
// Description: Schema + semantic validation and normalization of
//              start_domain_test params before any side effect.
// Purpose: Guarantee every TestParams handed to the fingerprinter and the
//          store has already passed every rule in §4.1.
// Dependencies: serde_json
// ============================================================================

use std::collections::BTreeSet;

use serde_json::Value;

use crate::domain;
use crate::error::BrokerError;
use crate::error::ValidationErrors;
use crate::i18n::LocaleTag;
use crate::i18n::is_supported_language;
use crate::params::DsInfo;
use crate::params::NameServer;
use crate::params::TestParams;

/// One `{path, message}` validation problem (re-exported for callers that
/// only need the shape, not the accumulator).
pub type ValidationError = crate::error::FieldError;

/// Default priority applied to direct `start_domain_test` submissions.
pub const DEFAULT_PRIORITY: i32 = 10;
/// Default queue applied to direct `start_domain_test` submissions.
pub const DEFAULT_QUEUE: i32 = 0;
/// Default profile name when none is supplied.
pub const DEFAULT_PROFILE: &str = "default";

/// The top-level fields `start_domain_test` accepts (§4.1 "Unknown
/// properties").
const START_DOMAIN_TEST_FIELDS: &[&str] = &[
    "domain",
    "ipv4",
    "ipv6",
    "nameservers",
    "ds_info",
    "profile",
    "client_id",
    "client_version",
    "priority",
    "queue",
    "language",
];

/// Validates and normalizes inbound RPC params (C1).
pub struct Validator {
    profiles: BTreeSet<String>,
    locales: Vec<LocaleTag>,
}

impl Validator {
    /// Builds a validator from the configured profile and locale sets.
    /// `"default"` is always present regardless of what was configured
    /// (§6 `profile_names`: "Always contains `\"default\"`").
    #[must_use]
    pub fn new(profiles: impl IntoIterator<Item = String>, locales: Vec<LocaleTag>) -> Self {
        let mut profiles: BTreeSet<String> = profiles.into_iter().collect();
        profiles.insert(DEFAULT_PROFILE.to_string());
        Self { profiles, locales }
    }

    /// The configured profile names, always including `"default"` (§6
    /// `profile_names`).
    pub fn profile_names(&self) -> impl Iterator<Item = &str> {
        self.profiles.iter().map(String::as_str)
    }

    /// The union of unambiguous short tags and full tags for every
    /// configured locale (§6 `get_language_tags`).
    #[must_use]
    pub fn language_tags(&self) -> Vec<String> {
        crate::i18n::language_tags(&self.locales)
    }

    /// Validates a `start_domain_test` params object, returning fully
    /// defaulted, but not yet canonically ordered, [`TestParams`].
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::User` with a `data` array of `{path,
    /// message}` problems (§7).
    pub fn validate_start_domain_test(&self, raw: &Value) -> Result<TestParams, BrokerError> {
        let mut errors = ValidationErrors::new();
        let obj = raw.as_object().ok_or_else(|| {
            BrokerError::user_message("params must be a JSON object")
        })?;

        reject_unknown_fields(obj, START_DOMAIN_TEST_FIELDS, &mut errors);

        let domain = match obj.get("domain").and_then(Value::as_str) {
            Some(d) => match domain::validate_domain(d) {
                Ok(ascii) => Some(domain::normalize_domain(&ascii)),
                Err(message) => {
                    errors.push("/domain", message);
                    None
                }
            },
            None => {
                errors.push("/domain", "domain is required");
                None
            }
        };

        let ipv4 = obj.get("ipv4").map_or(false, coerce_bool);
        let ipv6 = obj.get("ipv6").map_or(false, coerce_bool);

        let nameservers = obj
            .get("nameservers")
            .map(|v| self.validate_nameservers(v, &mut errors))
            .unwrap_or_default();

        let ds_info = obj
            .get("ds_info")
            .map(|v| self.validate_ds_info(v, &mut errors))
            .unwrap_or_default();

        let profile = self.validate_profile(obj.get("profile"), &mut errors);

        let priority = obj
            .get("priority")
            .map(|v| coerce_int(v, "/priority", &mut errors))
            .unwrap_or(Some(i64::from(DEFAULT_PRIORITY)))
            .unwrap_or(i64::from(DEFAULT_PRIORITY));

        let queue = obj
            .get("queue")
            .map(|v| coerce_int(v, "/queue", &mut errors))
            .unwrap_or(Some(i64::from(DEFAULT_QUEUE)))
            .unwrap_or(i64::from(DEFAULT_QUEUE));

        let language = obj.get("language").and_then(Value::as_str).map(str::to_string);
        let mut language_valid = true;
        if let Some(tag) = &language {
            if !is_supported_language(tag, &self.locales) {
                errors.push("/language", "Unknown language tag");
                language_valid = false;
            }
        }

        let client_id = obj.get("client_id").and_then(Value::as_str).map(str::to_string);
        let client_version = obj.get("client_version").and_then(Value::as_str).map(str::to_string);

        if !errors.is_empty() {
            let translate_to = if language_valid { language.as_deref().unwrap_or("") } else { "" };
            errors.translate(translate_to);
            return Err(errors.into_broker_error());
        }

        Ok(TestParams {
            domain: domain.unwrap_or_default(),
            ipv4,
            ipv6,
            nameservers,
            ds_info,
            profile: profile.unwrap_or_else(|| DEFAULT_PROFILE.to_string()),
            client_id,
            client_version,
            priority: priority.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
            queue: queue.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
            language,
        })
    }

    fn validate_nameservers(&self, value: &Value, errors: &mut ValidationErrors) -> Vec<NameServer> {
        let Some(array) = value.as_array() else {
            errors.push("/nameservers", "nameservers must be an array");
            return Vec::new();
        };
        let mut out = Vec::with_capacity(array.len());
        for (index, entry) in array.iter().enumerate() {
            let path = format!("/nameservers/{index}");
            let Some(obj) = entry.as_object() else {
                errors.push(path, "nameserver entry must be an object");
                continue;
            };
            let Some(ns_raw) = obj.get("ns").and_then(Value::as_str) else {
                errors.push(format!("{path}/ns"), "ns is required");
                continue;
            };
            let ns = match domain::validate_domain(ns_raw) {
                Ok(ascii) => domain::normalize_domain(&ascii),
                Err(message) => {
                    errors.push(format!("{path}/ns"), message);
                    continue;
                }
            };
            let ip = match obj.get("ip").and_then(Value::as_str) {
                Some(raw_ip) => match domain::validate_ip(raw_ip) {
                    Ok(parsed) => Some(domain::canonicalize_ip(parsed)),
                    Err(message) => {
                        errors.push(format!("{path}/ip"), message);
                        continue;
                    }
                },
                None => None,
            };
            out.push(NameServer { ns, ip });
        }
        out
    }

    fn validate_ds_info(&self, value: &Value, errors: &mut ValidationErrors) -> Vec<DsInfo> {
        let Some(array) = value.as_array() else {
            errors.push("/ds_info", "ds_info must be an array");
            return Vec::new();
        };
        let mut out = Vec::with_capacity(array.len());
        for (index, entry) in array.iter().enumerate() {
            let path = format!("/ds_info/{index}");
            let Some(obj) = entry.as_object() else {
                errors.push(path, "ds_info entry must be an object");
                continue;
            };
            let Some(digest) = obj.get("digest").and_then(Value::as_str) else {
                errors.push(format!("{path}/digest"), "digest is required");
                continue;
            };
            if !matches!(digest.len(), 40 | 64 | 96) || !digest.bytes().all(|b| b.is_ascii_hexdigit())
            {
                errors.push(format!("{path}/digest"), "digest must be 40, 64, or 96 hex characters");
                continue;
            }
            let Some(algorithm) = obj.get("algorithm").and_then(|v| coerce_int(v, path.as_str(), errors))
            else {
                continue;
            };
            let Some(digtype) = obj.get("digtype").and_then(|v| coerce_int(v, path.as_str(), errors)) else {
                continue;
            };
            let Some(keytag) = obj.get("keytag").and_then(|v| coerce_int(v, path.as_str(), errors)) else {
                continue;
            };
            out.push(DsInfo {
                keytag: keytag.clamp(0, i64::from(u16::MAX)) as u16,
                algorithm: algorithm.clamp(0, i64::from(u8::MAX)) as u8,
                digtype: digtype.clamp(0, i64::from(u8::MAX)) as u8,
                digest: digest.to_ascii_lowercase(),
            });
        }
        out
    }

    fn validate_profile(&self, value: Option<&Value>, errors: &mut ValidationErrors) -> Option<String> {
        let Some(raw) = value.and_then(Value::as_str) else {
            return Some(DEFAULT_PROFILE.to_string());
        };
        let lowered = raw.to_ascii_lowercase();
        if !is_profile_name_shape(&lowered) {
            errors.push("/profile", "Invalid profile name");
            return None;
        }
        if !self.profiles.contains(&lowered) {
            errors.push("/profile", "Unknown profile");
            return None;
        }
        Some(lowered)
    }

    /// Validates the shared `test_params` object of `add_batch_job` (§6).
    ///
    /// Identical to [`Validator::validate_start_domain_test`] except that
    /// `domain` is neither required nor accepted: each Batch entry supplies
    /// its own domain, which the store substitutes per Test.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::User` with a `data` array of `{path, message}`
    /// problems (§7).
    pub fn validate_batch_test_params(&self, raw: Option<&Value>) -> Result<TestParams, BrokerError> {
        let Some(raw) = raw else {
            return Ok(TestParams {
                domain: String::new(),
                ipv4: false,
                ipv6: false,
                nameservers: Vec::new(),
                ds_info: Vec::new(),
                profile: DEFAULT_PROFILE.to_string(),
                client_id: None,
                client_version: None,
                priority: DEFAULT_PRIORITY,
                queue: DEFAULT_QUEUE,
                language: None,
            });
        };
        let mut errors = ValidationErrors::new();
        let obj = raw
            .as_object()
            .ok_or_else(|| BrokerError::user_message("test_params must be a JSON object"))?;

        reject_unknown_fields(obj, BATCH_TEST_PARAMS_FIELDS, &mut errors);

        let ipv4 = obj.get("ipv4").map_or(false, coerce_bool);
        let ipv6 = obj.get("ipv6").map_or(false, coerce_bool);
        let nameservers = obj
            .get("nameservers")
            .map(|v| self.validate_nameservers(v, &mut errors))
            .unwrap_or_default();
        let ds_info = obj
            .get("ds_info")
            .map(|v| self.validate_ds_info(v, &mut errors))
            .unwrap_or_default();
        let profile = self.validate_profile(obj.get("profile"), &mut errors);
        let language = obj.get("language").and_then(Value::as_str).map(str::to_string);
        let mut language_valid = true;
        if let Some(tag) = &language {
            if !is_supported_language(tag, &self.locales) {
                errors.push("/language", "Unknown language tag");
                language_valid = false;
            }
        }

        if !errors.is_empty() {
            let translate_to = if language_valid { language.as_deref().unwrap_or("") } else { "" };
            errors.translate(translate_to);
            return Err(errors.into_broker_error());
        }

        Ok(TestParams {
            domain: String::new(),
            ipv4,
            ipv6,
            nameservers,
            ds_info,
            profile: profile.unwrap_or_else(|| DEFAULT_PROFILE.to_string()),
            client_id: None,
            client_version: None,
            priority: DEFAULT_PRIORITY,
            queue: DEFAULT_QUEUE,
            language,
        })
    }
}

/// The fields `add_batch_job`'s shared `test_params` accepts; `domain` is
/// deliberately absent since each Batch entry supplies its own (§6).
const BATCH_TEST_PARAMS_FIELDS: &[&str] =
    &["ipv4", "ipv6", "nameservers", "ds_info", "profile", "language"];

/// `^[a-z0-9]([a-z0-9_\-]{0,29}[a-z0-9])?$`.
fn is_profile_name_shape(name: &str) -> bool {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > 31 {
        return false;
    }
    let is_alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let is_body = |b: u8| is_alnum(b) || b == b'_' || b == b'-';
    if bytes.len() == 1 {
        return is_alnum(bytes[0]);
    }
    is_alnum(bytes[0]) && is_alnum(bytes[bytes.len() - 1]) && bytes[1..bytes.len() - 1].iter().all(|&b| is_body(b))
}

fn reject_unknown_fields(
    obj: &serde_json::Map<String, Value>,
    allowed: &[&str],
    errors: &mut ValidationErrors,
) {
    for key in obj.keys() {
        if !allowed.contains(&key.as_str()) {
            errors.push(format!("/{key}"), "Unknown parameter");
        }
    }
}

/// Boolean coercion rule from §4.1: `{false, null, "", "0", 0}` is false,
/// everything else is true.
#[must_use]
pub fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Number(n) => n.as_f64().is_none_or(|f| f != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Integer coercion rule from §4.1: strings encoding integers are
/// coerced, fractional numbers round half-away-from-zero.
fn coerce_int(value: &Value, path: impl Into<String>, errors: &mut ValidationErrors) -> Option<i64> {
    match coerce_int_loose(value) {
        Some(i) => Some(i),
        None => {
            errors.push(path.into(), "must be an integer");
            None
        }
    }
}

/// The same coercion rule as [`coerce_int`], without an accumulator, for
/// callers outside `start_domain_test` that still owe the boundary its
/// type-coercion rule (`offset`, `limit`, `batch_id`, §4.1).
#[must_use]
pub fn coerce_int_loose(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            n.as_i64().or_else(|| n.as_f64().map(round_half_away_from_zero))
        }
        Value::String(s) => {
            s.parse::<i64>().ok().or_else(|| s.parse::<f64>().ok().map(round_half_away_from_zero))
        }
        _ => None,
    }
}

fn round_half_away_from_zero(value: f64) -> i64 {
    let rounded = if value >= 0.0 { (value + 0.5).floor() } else { (value - 0.5).ceil() };
    rounded as i64
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::*;
    use serde_json::json;

    fn validator() -> Validator {
        Validator::new(
            ["default".to_string(), "custom".to_string()],
            vec![
                LocaleTag { short: "en".to_string(), full: "en_US".to_string() },
                LocaleTag { short: "fr".to_string(), full: "fr_FR".to_string() },
            ],
        )
    }

    #[test]
    fn bool_coercion_matches_spec_falsy_set() {
        assert!(!coerce_bool(&json!(false)));
        assert!(!coerce_bool(&json!(null)));
        assert!(!coerce_bool(&json!("")));
        assert!(!coerce_bool(&json!("0")));
        assert!(!coerce_bool(&json!(0)));
        assert!(coerce_bool(&json!(true)));
        assert!(coerce_bool(&json!("false")));
        assert!(coerce_bool(&json!(1)));
    }

    #[test]
    fn int_coercion_rounds_half_away_from_zero() {
        assert_eq!(round_half_away_from_zero(2.5), 3);
        assert_eq!(round_half_away_from_zero(-2.5), -3);
        assert_eq!(round_half_away_from_zero(2.4), 2);
        assert_eq!(round_half_away_from_zero(-2.4), -2);
    }

    #[test]
    fn valid_submission_is_accepted_with_defaults() {
        let params = validator()
            .validate_start_domain_test(&json!({ "domain": "zonemaster.net" }))
            .unwrap();
        assert_eq!(params.domain, "zonemaster.net");
        assert_eq!(params.profile, "default");
        assert_eq!(params.priority, DEFAULT_PRIORITY);
        assert_eq!(params.queue, DEFAULT_QUEUE);
    }

    #[test]
    fn unknown_top_level_property_is_rejected() {
        let err = validator()
            .validate_start_domain_test(&json!({ "domain": "zonemaster.net", "bogus": 1 }))
            .unwrap_err();
        assert!(matches!(err, BrokerError::User { .. }));
    }

    #[test]
    fn invalid_domain_yields_documented_message() {
        let err = validator()
            .validate_start_domain_test(&json!({ "domain": "ex ample.com" }))
            .unwrap_err();
        let BrokerError::User { data: Some(data), .. } = err else {
            panic!("expected user error");
        };
        let first = &data[0];
        assert_eq!(first["path"], "/domain");
        assert_eq!(first["message"], "The domain name character(s) are not supported");
    }

    #[test]
    fn validation_messages_are_translated_to_the_requested_language() {
        let err = validator()
            .validate_start_domain_test(&json!({ "domain": "ex ample.com", "language": "fr" }))
            .unwrap_err();
        let BrokerError::User { data: Some(data), .. } = err else {
            panic!("expected user error");
        };
        assert_eq!(
            data[0]["message"],
            "Les caractères du nom de domaine ne sont pas pris en charge"
        );
    }

    #[test]
    fn invalid_language_tag_falls_back_to_untranslated_messages() {
        let err = validator()
            .validate_start_domain_test(&json!({ "domain": "ex ample.com", "language": "zz" }))
            .unwrap_err();
        let BrokerError::User { data: Some(data), .. } = err else {
            panic!("expected user error");
        };
        assert_eq!(data[0]["message"], "The domain name character(s) are not supported");
    }

    #[test]
    fn unknown_profile_is_rejected() {
        let err = validator()
            .validate_start_domain_test(&json!({ "domain": "zonemaster.net", "profile": "nope" }))
            .unwrap_err();
        let BrokerError::User { data: Some(data), .. } = err else {
            panic!("expected user error");
        };
        assert_eq!(data[0]["message"], "Unknown profile");
    }

    #[test]
    fn priority_coerces_from_string_and_fraction() {
        let params = validator()
            .validate_start_domain_test(&json!({ "domain": "zonemaster.net", "priority": "7" }))
            .unwrap();
        assert_eq!(params.priority, 7);
    }

    #[test]
    fn batch_test_params_does_not_require_domain() {
        let params = validator()
            .validate_batch_test_params(Some(&json!({ "ipv4": true, "profile": "custom" })))
            .unwrap();
        assert_eq!(params.domain, "");
        assert!(params.ipv4);
        assert_eq!(params.profile, "custom");
    }

    #[test]
    fn batch_test_params_rejects_domain_field() {
        let err = validator()
            .validate_batch_test_params(Some(&json!({ "domain": "zonemaster.net" })))
            .unwrap_err();
        assert!(matches!(err, BrokerError::User { .. }));
    }

    #[test]
    fn batch_test_params_defaults_when_absent() {
        let params = validator().validate_batch_test_params(None).unwrap();
        assert_eq!(params.profile, "default");
        assert_eq!(params.priority, DEFAULT_PRIORITY);
    }

    #[test]
    fn profile_names_always_contains_default() {
        let v = Validator::new(Vec::<String>::new(), vec![]);
        assert!(v.profile_names().any(|p| p == "default"));
    }

    #[test]
    fn language_tags_forwards_to_i18n_union() {
        let tags = validator().language_tags();
        assert!(tags.contains(&"en".to_string()));
        assert!(tags.contains(&"fr_FR".to_string()));
    }

    #[test]
    fn coerce_int_loose_handles_strings_and_fractions() {
        assert_eq!(coerce_int_loose(&json!("7")), Some(7));
        assert_eq!(coerce_int_loose(&json!(2.5)), Some(3));
        assert_eq!(coerce_int_loose(&json!("not a number")), None);
    }

    #[test]
    fn nameservers_and_ds_info_are_validated() {
        let params = validator()
            .validate_start_domain_test(&json!({
                "domain": "zonemaster.net",
                "nameservers": [{"ns": "ns1.zonemaster.net"}],
                "ds_info": [{"digest": "a".repeat(64), "algorithm": 8, "digtype": 2, "keytag": 12345}],
            }))
            .unwrap();
        assert_eq!(params.nameservers.len(), 1);
        assert_eq!(params.ds_info.len(), 1);
    }
}
