// zm-broker-core/src/i18n.rs
// ============================================================================
// Module: Message Catalog Stand-In
// Description: A minimal built-in substitute for the external translation
//              catalog referenced by C6.
// Purpose: Let the validator and RPC layer exercise the translate/locale
//          contract without depending on the real (out-of-scope) catalog.
// Dependencies: none
// ============================================================================

//! The real translation catalog is an external collaborator (§1 Out of
//! scope). This module only needs to demonstrate the contract: look up a
//! source message in a requested locale, and fall back to the untranslated
//! source form when the locale is invalid or the message has no entry
//! (§4.1).

/// A (short tag, full tag) pair for one configured locale.
#[derive(Debug, Clone)]
pub struct LocaleTag {
    /// Two-character short tag, e.g. `en`.
    pub short: String,
    /// Five-character full tag, e.g. `en_US`.
    pub full: String,
}

/// A tiny built-in catalog mapping `(source message, language tag)` to a
/// translated string. Unknown pairs fall back to the source message.
const CATALOG: &[(&str, &str, &str)] = &[
    (
        "The domain name character(s) are not supported",
        "fr",
        "Les caractères du nom de domaine ne sont pas pris en charge",
    ),
    ("Unknown profile", "fr", "Profil inconnu"),
    ("Batch job still running", "fr", "Travail de lot toujours en cours"),
];

/// Translates `message` into `language`, falling back to `message`
/// unchanged when no catalog entry exists or the language tag itself is
/// invalid (empty).
#[must_use]
pub fn translate(message: &str, language: &str) -> String {
    if language.is_empty() {
        return message.to_string();
    }
    CATALOG
        .iter()
        .find(|(src, lang, _)| *src == message && *lang == language)
        .map_or_else(|| message.to_string(), |(_, _, translated)| (*translated).to_string())
}

/// Validates a language tag against the configured locale set. Accepts a
/// bare two-character short tag only when it is unambiguous across the
/// configured full tags (§6 `get_language_tags`).
#[must_use]
pub fn is_supported_language(tag: &str, configured: &[LocaleTag]) -> bool {
    if tag.len() == 2 {
        return configured.iter().any(|l| l.short.eq_ignore_ascii_case(tag));
    }
    if tag.len() == 5 {
        return configured.iter().any(|l| l.full.eq_ignore_ascii_case(tag));
    }
    false
}

/// Returns the union of short tags (only when unambiguous) and full tags
/// for `get_language_tags` (§6).
#[must_use]
pub fn language_tags(configured: &[LocaleTag]) -> Vec<String> {
    let mut tags = Vec::new();
    for locale in configured {
        let short_count = configured.iter().filter(|l| l.short == locale.short).count();
        if short_count == 1 && !tags.contains(&locale.short) {
            tags.push(locale.short.clone());
        }
        tags.push(locale.full.clone());
    }
    tags
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::*;

    fn locales() -> Vec<LocaleTag> {
        vec![
            LocaleTag { short: "en".to_string(), full: "en_US".to_string() },
            LocaleTag { short: "fr".to_string(), full: "fr_FR".to_string() },
        ]
    }

    #[test]
    fn translate_falls_back_to_source_when_unknown() {
        assert_eq!(translate("Unmapped message", "fr"), "Unmapped message");
        assert_eq!(translate("Unknown profile", ""), "Unknown profile");
    }

    #[test]
    fn translate_finds_catalog_entry() {
        assert_eq!(translate("Unknown profile", "fr"), "Profil inconnu");
    }

    #[test]
    fn short_tag_is_unambiguous_across_two_locales() {
        let locales = locales();
        assert!(is_supported_language("en", &locales));
        assert!(is_supported_language("fr_FR", &locales));
        assert!(!is_supported_language("de", &locales));
    }

    #[test]
    fn short_tag_becomes_ambiguous_with_two_regions() {
        let locales = vec![
            LocaleTag { short: "en".to_string(), full: "en_US".to_string() },
            LocaleTag { short: "en".to_string(), full: "en_GB".to_string() },
        ];
        let tags = language_tags(&locales);
        assert!(!tags.contains(&"en".to_string()));
        assert!(tags.contains(&"en_US".to_string()));
        assert!(tags.contains(&"en_GB".to_string()));
    }
}
