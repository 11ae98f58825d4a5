// zm-broker-store/src/lib.rs
// ============================================================================
// Module: Durable Job Store (C3 + C4)
// Description: The polymorphic persistence interface and its three
//              interchangeable SQL backends.
// Purpose: Own the claim/progress/read contract external Test Agents rely
//          on (C4), behind one trait so the RPC layer never needs to know
//          which backend is configured.
// Dependencies: zm-broker-core, rusqlite, postgres, mysql, r2d2, serde
// ============================================================================

//! ## Overview
//! [`Store`] is implemented three times — [`sqlite::SqliteStore`] (embedded,
//! single-file), [`postgres::PostgresStore`] (client-server relational A),
//! and [`mysql::MysqlStore`] (client-server relational B) — and MUST behave
//! identically from the broker's perspective modulo the documented
//! unique-violation-signaling differences each adapter normalizes away
//! (§4.3.3). The only operation whose concurrency primitive varies is
//! [`Store::claim_next`]; each adapter documents its own guarantee.

/// Shared schema constants and row shapes used by every backend.
pub mod common;
/// `MySQL`-backed store (client-server relational B).
pub mod mysql_store;
/// Postgres-backed store (client-server relational A).
pub mod postgres_store;
/// `SQLite`-backed store (embedded single-file).
pub mod sqlite_store;

use serde_json::Value;
use zm_broker_core::BatchId;
use zm_broker_core::BrokerError;
use zm_broker_core::TestId;
use zm_broker_core::TestParams;
use zm_broker_core::Username;

pub use common::BatchStatus;
pub use common::HistoryEntry;
pub use common::HistoryFilter;
pub use common::TestRecord;
pub use mysql_store::MysqlStore;
pub use mysql_store::MysqlStoreConfig;
pub use postgres_store::PostgresStore;
pub use postgres_store::PostgresStoreConfig;
pub use sqlite_store::SqliteStore;
pub use sqlite_store::SqliteStoreConfig;

/// The durable job store contract (C3). Every method maps store-specific
/// failures to [`BrokerError::Internal`]; store-detected user errors
/// (unknown user, wrong key, open batch) map to `BrokerError::User`.
pub trait Store: Send + Sync {
    /// Reuses or creates a Test for `params`, returning its id (§4.3.2).
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Internal` on store failure.
    fn create_test(&self, params: &TestParams, reuse_window_s: i64) -> Result<TestId, BrokerError>;

    /// Atomically claims the next runnable Test on `queue`, honoring
    /// `max_concurrent` (§4.3.2, C4).
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Internal` on store failure.
    fn claim_next(&self, queue: i32, max_concurrent: i64) -> Result<Option<TestId>, BrokerError>;

    /// Monotonically advances progress; writes below the current value are
    /// a no-op. `progress = 100` also stores `results` and sets the end
    /// time in the same commit (§3 invariant 3).
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Internal` on store failure.
    fn set_progress(
        &self,
        test_id: &TestId,
        progress: i32,
        results: Option<&Value>,
    ) -> Result<(), BrokerError>;

    /// Atomically stores a results document. Rejected as an internal error
    /// if the Test has not been claimed yet (§4.3.2).
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Internal` if the Test is not yet running or on
    /// store failure.
    fn store_results(&self, test_id: &TestId, results: &Value) -> Result<(), BrokerError>;

    /// Reads a Test's current state. Never fails if the id exists.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::User` if the id does not exist, or
    /// `BrokerError::Internal` on store failure.
    fn read_test(&self, test_id: &TestId) -> Result<TestRecord, BrokerError>;

    /// Returns up to `limit` finished-or-running tests for `domain`,
    /// newest first (§4.3.2).
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Internal` on store failure.
    fn history(
        &self,
        domain: &str,
        offset: i64,
        limit: i64,
        filter: HistoryFilter,
    ) -> Result<Vec<HistoryEntry>, BrokerError>;

    /// Creates a Batch for `username`, one Test per domain, after verifying
    /// credentials and the no-open-batch invariant atomically (§4.3.2, §5).
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::User` on bad credentials or an open batch, or
    /// `BrokerError::Internal` on store failure.
    fn create_batch(
        &self,
        username: &Username,
        test_params: &TestParams,
        domains: &[String],
    ) -> Result<BatchId, BrokerError>;

    /// Returns the running/finished counts and finished test ids for a
    /// Batch.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Internal` on store failure.
    fn batch_status(&self, batch_id: BatchId) -> Result<BatchStatus, BrokerError>;

    /// Idempotently registers a user. Returns `1` on first insert, `0` for
    /// any conflict (existing username, whether or not the key matches) —
    /// the caller normalizes both cases (§4.3.2).
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Internal` on store failure.
    fn add_user(&self, username: &Username, api_key: &str) -> Result<u8, BrokerError>;

    /// Constant-time credential check.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Internal` on store failure.
    fn verify_user(&self, username: &Username, api_key: &str) -> Result<bool, BrokerError>;
}
