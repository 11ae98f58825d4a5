// zm-broker-store/src/common.rs
// ============================================================================
// Module: Shared Store Types
// Description: Row shapes and filters common to every backend adapter.
// Purpose: Keep the wire shape of a read test/history entry/batch status
//          identical across sqlite/postgres/mysql.
// Dependencies: serde_json, zm-broker-core
// ============================================================================

use serde_json::Value;
use zm_broker_core::TestId;

/// `history()` filter on the `undelegated` flag (§4.3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryFilter {
    /// No filtering.
    All,
    /// Only tests with `undelegated = true`.
    Delegated,
    /// Only tests with `undelegated = false`.
    Undelegated,
}

/// The full current state of a Test, as returned by `read_test` (§4.3.2).
#[derive(Debug, Clone)]
pub struct TestRecord {
    /// The 16-character hex test id.
    pub test_id: TestId,
    /// Surrogate sequential integer id.
    pub id: i64,
    /// Creation timestamp, RFC 3339.
    pub creation_time: String,
    /// Start timestamp, RFC 3339, if claimed.
    pub start_time: Option<String>,
    /// End timestamp, RFC 3339, if finished.
    pub end_time: Option<String>,
    /// Current progress, 0..=100.
    pub progress: i32,
    /// The normalized params this Test was created with.
    pub params: Value,
    /// The results document, present only once `progress = 100` (§3
    /// invariant 4).
    pub results: Option<Value>,
    /// Whether the Test was created with nameservers/ds_info present.
    pub undelegated: bool,
}

/// One row of `history()` output (§6 `get_test_history`).
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// Surrogate sequential integer id.
    pub id: i64,
    /// Creation timestamp, RFC 3339.
    pub creation_time: String,
    /// Maximum severity observed among the Test's results, rolled up.
    pub overall_result: zm_broker_core::OverallResult,
    /// Whether the Test was created with nameservers/ds_info present.
    pub undelegated: bool,
}

/// `batch_status()` output (§6 `get_batch_job_result`).
#[derive(Debug, Clone)]
pub struct BatchStatus {
    /// Count of Tests in the Batch with `progress < 100`.
    pub nb_running: i64,
    /// Count of Tests in the Batch with `progress = 100`.
    pub nb_finished: i64,
    /// Test ids of the finished Tests.
    pub finished_test_ids: Vec<TestId>,
}
