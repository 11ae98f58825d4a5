// zm-broker-core/src/lib.rs
// ============================================================================
// Module: Test Request Broker Core
// Description: Domain types, validation, fingerprinting, and error taxonomy
//              shared by every component of the broker.
// Purpose: Give the store and RPC crates a single, dependency-light source
//          of truth for what a test request looks like once it is accepted.
// Dependencies: idna, md-5, serde, serde_json, serde_jcs, thiserror, time
// ============================================================================

//! ## Overview
//! This crate owns the parts of the broker that have no business talking to
//! a database or a socket: parameter validation (C1), fingerprint derivation
//! (C2), the domain model (Test / Batch / User / ResultEntry), severity
//! levels, and the three-kind error taxonomy (C7) that every other crate
//! normalizes its failures into.

/// Domain name and IP address validation.
pub mod domain;
/// Strongly typed identifiers for tests, batches, and users.
pub mod ids;
/// Error taxonomy shared across the broker (C7).
pub mod error;
/// Deterministic fingerprint derivation (C2).
pub mod fingerprint;
/// Minimal built-in message catalog standing in for the external translator.
pub mod i18n;
/// Test parameter types and normalization.
pub mod params;
/// Result severity levels and overall-result derivation.
pub mod severity;
/// Inbound parameter validation (C1).
pub mod validate;

pub use error::BrokerError;
pub use error::FieldError;
pub use error::ValidationErrors;
pub use fingerprint::Fingerprint;
pub use i18n::LocaleTag;
pub use ids::ApiKey;
pub use ids::BatchId;
pub use ids::TestId;
pub use ids::Username;
pub use params::DsInfo;
pub use params::NameServer;
pub use params::TestParams;
pub use severity::Level;
pub use severity::OverallResult;
pub use validate::ValidationError;
pub use validate::Validator;
