// zm-broker-core/src/error.rs
// ============================================================================
// Module: Error Taxonomy
// Description: The three-kind error model (C7) every crate normalizes into.
// Purpose: Keep user-facing, permission, and internal failures distinct so
//          the RPC layer can map them to JSON-RPC codes without guessing.
// Dependencies: serde_json, thiserror
// ============================================================================

use serde_json::Value;
use thiserror::Error;

/// One `{path, message}` validation problem, addressable by JSON Pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// JSON Pointer into the submitted params object.
    pub path: String,
    /// Human-readable, translatable problem description.
    pub message: String,
}

/// The broker's three-kind error taxonomy (C7).
///
/// `User` errors are never logged at error severity; `Internal` errors
/// always are. `Permission` is its own variant because it always carries
/// the caller's remote IP in `data`, which the other two kinds do not.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Invalid params, unknown profile, unknown user, open batch, etc.
    #[error("{message}")]
    User {
        /// Short, actionable message safe to return verbatim.
        message: String,
        /// Structured detail identifying the offending field or entity.
        data: Option<Value>,
    },
    /// An administrative method was called from a non-loopback address.
    #[error("permission denied for remote {remote_ip}")]
    Permission {
        /// The remote address the call was rejected for.
        remote_ip: String,
    },
    /// Any unexpected failure (store, translator, serialization, ...).
    #[error("internal error: {message}")]
    Internal {
        /// Message surfaced to the client; may leak internals (documented).
        message: String,
    },
}

impl BrokerError {
    /// Builds a user error carrying a single `{path, message}` detail.
    #[must_use]
    pub fn user(path: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::User {
            data: Some(serde_json::json!([{ "path": path, "message": message }])),
            message,
        }
    }

    /// Builds a user error with an arbitrary structured `data` payload.
    #[must_use]
    pub fn user_with_data(message: impl Into<String>, data: Value) -> Self {
        Self::User { message: message.into(), data: Some(data) }
    }

    /// Builds a bare user error with no structured detail.
    #[must_use]
    pub fn user_message(message: impl Into<String>) -> Self {
        Self::User { message: message.into(), data: None }
    }

    /// Builds an internal error from any displayable cause.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Builds a permission-denied error for the given remote address.
    #[must_use]
    pub fn permission_denied(remote_ip: impl Into<String>) -> Self {
        Self::Permission { remote_ip: remote_ip.into() }
    }

    /// Whether this error should be logged at error severity by an audit
    /// sink (internal errors only, per §4.7).
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

/// An ordered collection of field-level validation problems (C1 output).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    /// Returns an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no problems were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Records a single problem.
    pub fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError { path: path.into(), message: message.into() });
    }

    /// Translates every recorded message into `language` in place, falling
    /// back to the untranslated source form for unmapped messages or an
    /// empty `language` (§4.1: "All messages are translated to the
    /// requested language; if the language itself is invalid, translation
    /// falls back to the untranslated source form."). Callers pass `""` for
    /// `language` when the submitted tag itself failed validation.
    pub fn translate(&mut self, language: &str) {
        for error in &mut self.0 {
            error.message = crate::i18n::translate(&error.message, language);
        }
    }

    /// Converts the collection into a `BrokerError::User` with a `data`
    /// array of `{path, message}` objects, per §4.1 and §7.
    #[must_use]
    pub fn into_broker_error(self) -> BrokerError {
        let data = Value::Array(
            self.0
                .into_iter()
                .map(|e| serde_json::json!({ "path": e.path, "message": e.message }))
                .collect(),
        );
        BrokerError::User { message: "Invalid params".to_string(), data: Some(data) }
    }
}
