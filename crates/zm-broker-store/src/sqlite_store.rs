// zm-broker-store/src/sqlite_store.rs
// ============================================================================
// Module: SQLite Job Store
// Description: Embedded single-file Store backend (C3) backed by SQLite WAL.
// Purpose: Reference/default backend; serializes every operation, including
//          claim_next, behind one mutex-guarded connection.
// Dependencies: zm-broker-core, rusqlite, serde_json, subtle, time
// ============================================================================

//! ## Overview
//! A single `SQLite` connection guarded by a mutex stands in for a
//! connection pool: every [`Store`] method takes the lock for the duration
//! of its transaction, which trivially gives `claim_next` the linearizable
//! guarantee §4.3.2 requires without a separate advisory-lock scheme.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use serde_json::Value;
use subtle::ConstantTimeEq;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use zm_broker_core::BatchId;
use zm_broker_core::BrokerError;
use zm_broker_core::Level;
use zm_broker_core::OverallResult;
use zm_broker_core::TestId;
use zm_broker_core::TestParams;
use zm_broker_core::Username;

use crate::Store;
use crate::common::BatchStatus;
use crate::common::HistoryEntry;
use crate::common::HistoryFilter;
use crate::common::TestRecord;

/// Default busy timeout (ms) applied to the single connection.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default `history()` page size (§4.3.2).
pub const DEFAULT_HISTORY_LIMIT: i64 = 200;

/// Configuration for the `SQLite` store.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// `SQLite`-backed job store.
#[derive(Clone)]
pub struct SqliteStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (creating if absent) the `SQLite` job store at `config.path`.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Internal` if the file cannot be opened or the
    /// schema cannot be initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, BrokerError> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| BrokerError::internal(format!("store dir: {err}")))?;
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let connection = Connection::open_with_flags(&config.path, flags).map_err(db_err)?;
        connection.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;").map_err(db_err)?;
        connection
            .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
            .map_err(db_err)?;
        initialize_schema(&connection)?;
        Ok(Self { connection: Arc::new(Mutex::new(connection)) })
    }

    /// Opens an in-memory store, for tests.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Internal` if the schema cannot be initialized.
    pub fn open_in_memory() -> Result<Self, BrokerError> {
        let connection = Connection::open_in_memory().map_err(db_err)?;
        initialize_schema(&connection)?;
        Ok(Self { connection: Arc::new(Mutex::new(connection)) })
    }
}

fn initialize_schema(connection: &Connection) -> Result<(), BrokerError> {
    connection
        .execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                api_key TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS batch_jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL,
                creation_time INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS test_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hash_id TEXT NOT NULL UNIQUE,
                fingerprint INTEGER NOT NULL,
                domain TEXT NOT NULL,
                batch_id INTEGER NULL REFERENCES batch_jobs(id),
                creation_time INTEGER NOT NULL,
                start_time INTEGER NULL,
                end_time INTEGER NULL,
                progress INTEGER NOT NULL,
                params TEXT NOT NULL,
                results TEXT NULL,
                undelegated INTEGER NOT NULL,
                priority INTEGER NOT NULL,
                queue INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_test_results_fingerprint ON test_results(fingerprint);
            CREATE INDEX IF NOT EXISTS idx_test_results_domain ON test_results(domain);
            CREATE INDEX IF NOT EXISTS idx_test_results_claim ON test_results(queue, start_time, priority, id);
            CREATE INDEX IF NOT EXISTS idx_test_results_batch ON test_results(batch_id);",
        )
        .map_err(db_err)
}

fn db_err(err: rusqlite::Error) -> BrokerError {
    BrokerError::internal(format!("sqlite store error: {err}"))
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn format_rfc3339(unix: i64) -> Result<String, BrokerError> {
    OffsetDateTime::from_unix_timestamp(unix)
        .map_err(|err| BrokerError::internal(format!("timestamp out of range: {err}")))?
        .format(&Rfc3339)
        .map_err(|err| BrokerError::internal(format!("timestamp format: {err}")))
}

fn overall_result_of(results: Option<&Value>) -> OverallResult {
    let Some(Value::Array(entries)) = results else {
        return OverallResult::Ok;
    };
    let levels = entries.iter().filter_map(|entry| {
        let tag = entry.get("level")?.as_str()?;
        Level::from_engine_tag(tag)
    });
    OverallResult::from_levels(levels)
}

fn row_to_test_record(
    id: i64,
    hash_id: String,
    creation_time: i64,
    start_time: Option<i64>,
    end_time: Option<i64>,
    progress: i64,
    params_json: String,
    results_json: Option<String>,
    undelegated: i64,
) -> Result<TestRecord, BrokerError> {
    let params: Value = serde_json::from_str(&params_json)
        .map_err(|err| BrokerError::internal(format!("corrupt params: {err}")))?;
    let results = results_json
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|err| BrokerError::internal(format!("corrupt results: {err}")))?;
    Ok(TestRecord {
        test_id: TestId::parse(&hash_id)?,
        id,
        creation_time: format_rfc3339(creation_time)?,
        start_time: start_time.map(format_rfc3339).transpose()?,
        end_time: end_time.map(format_rfc3339).transpose()?,
        progress: i32::try_from(progress).unwrap_or(100),
        params,
        results,
        undelegated: undelegated != 0,
    })
}

impl Store for SqliteStore {
    fn create_test(&self, params: &TestParams, reuse_window_s: i64) -> Result<TestId, BrokerError> {
        let mut params = params.clone();
        params.canonicalize_order();
        let fingerprint = zm_broker_core::fingerprint::fingerprint(&params)?;
        let fingerprint_key = fingerprint.value().cast_signed();
        let params_json = serde_json::to_string(&params)
            .map_err(|err| BrokerError::internal(format!("serialize params: {err}")))?;

        let mut guard = self
            .connection
            .lock()
            .map_err(|_| BrokerError::internal("sqlite store mutex poisoned"))?;
        let tx = guard.transaction().map_err(db_err)?;
        let now = now_unix();
        let cutoff = now - reuse_window_s;

        let reusable: Option<String> = tx
            .query_row(
                "SELECT hash_id FROM test_results
                 WHERE fingerprint = ?1 AND (creation_time > ?2 OR progress < 100)
                 ORDER BY creation_time DESC LIMIT 1",
                params![fingerprint_key, cutoff],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        if let Some(hash_id) = reusable {
            tx.commit().map_err(db_err)?;
            return TestId::parse(&hash_id);
        }

        let test_id = fingerprint.test_id();
        let insert = tx.execute(
            "INSERT INTO test_results
             (hash_id, fingerprint, domain, batch_id, creation_time, start_time, end_time,
              progress, params, results, undelegated, priority, queue)
             VALUES (?1, ?2, ?3, NULL, ?4, NULL, NULL, 0, ?5, NULL, ?6, ?7, ?8)",
            params![
                test_id.as_str(),
                fingerprint_key,
                params.domain,
                now,
                params_json,
                i64::from(params.undelegated()),
                params.priority,
                params.queue,
            ],
        );
        match insert {
            Ok(_) => {
                tx.commit().map_err(db_err)?;
                Ok(test_id)
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                // Concurrent insert of the same fingerprint won the race; the
                // row now exists, so the earlier lookup branch applies.
                let hash_id: String = tx
                    .query_row(
                        "SELECT hash_id FROM test_results WHERE fingerprint = ?1 ORDER BY \
                         creation_time DESC LIMIT 1",
                        params![fingerprint_key],
                        |row| row.get(0),
                    )
                    .map_err(db_err)?;
                tx.commit().map_err(db_err)?;
                TestId::parse(&hash_id)
            }
            Err(err) => Err(db_err(err)),
        }
    }

    fn claim_next(&self, queue: i32, max_concurrent: i64) -> Result<Option<TestId>, BrokerError> {
        let mut guard = self
            .connection
            .lock()
            .map_err(|_| BrokerError::internal("sqlite store mutex poisoned"))?;
        let tx = guard.transaction().map_err(db_err)?;

        let running: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM test_results WHERE queue = ?1 AND start_time IS NOT NULL \
                 AND progress < 100",
                params![queue],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        if running >= max_concurrent {
            tx.commit().map_err(db_err)?;
            return Ok(None);
        }

        let candidate: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, hash_id FROM test_results WHERE queue = ?1 AND start_time IS NULL \
                 ORDER BY priority DESC, id ASC LIMIT 1",
                params![queue],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_err)?;
        let Some((id, hash_id)) = candidate else {
            tx.commit().map_err(db_err)?;
            return Ok(None);
        };

        tx.execute(
            "UPDATE test_results SET start_time = ?1 WHERE id = ?2 AND start_time IS NULL",
            params![now_unix(), id],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        TestId::parse(&hash_id).map(Some)
    }

    fn set_progress(
        &self,
        test_id: &TestId,
        progress: i32,
        results: Option<&Value>,
    ) -> Result<(), BrokerError> {
        let guard = self
            .connection
            .lock()
            .map_err(|_| BrokerError::internal("sqlite store mutex poisoned"))?;
        let current: Option<i64> = guard
            .query_row(
                "SELECT progress FROM test_results WHERE hash_id = ?1",
                params![test_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        let Some(current) = current else {
            return Err(BrokerError::internal("set_progress: unknown test id"));
        };
        if i64::from(progress) <= current {
            return Ok(());
        }
        if progress >= 100 {
            let results_json = results
                .map(serde_json::to_string)
                .transpose()
                .map_err(|err| BrokerError::internal(format!("serialize results: {err}")))?;
            guard
                .execute(
                    "UPDATE test_results SET progress = 100, end_time = ?1, results = COALESCE(?2, results) WHERE hash_id = ?3",
                    params![now_unix(), results_json, test_id.as_str()],
                )
                .map_err(db_err)?;
        } else {
            guard
                .execute(
                    "UPDATE test_results SET progress = ?1 WHERE hash_id = ?2",
                    params![progress, test_id.as_str()],
                )
                .map_err(db_err)?;
        }
        Ok(())
    }

    fn store_results(&self, test_id: &TestId, results: &Value) -> Result<(), BrokerError> {
        let guard = self
            .connection
            .lock()
            .map_err(|_| BrokerError::internal("sqlite store mutex poisoned"))?;
        let start_time: Option<Option<i64>> = guard
            .query_row(
                "SELECT start_time FROM test_results WHERE hash_id = ?1",
                params![test_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        match start_time {
            None => Err(BrokerError::internal("store_results: unknown test id")),
            Some(None) => Err(BrokerError::internal("store_results: test has not been claimed")),
            Some(Some(_)) => {
                let results_json = serde_json::to_string(results)
                    .map_err(|err| BrokerError::internal(format!("serialize results: {err}")))?;
                guard
                    .execute(
                        "UPDATE test_results SET results = ?1 WHERE hash_id = ?2",
                        params![results_json, test_id.as_str()],
                    )
                    .map_err(db_err)?;
                Ok(())
            }
        }
    }

    fn read_test(&self, test_id: &TestId) -> Result<TestRecord, BrokerError> {
        let guard = self
            .connection
            .lock()
            .map_err(|_| BrokerError::internal("sqlite store mutex poisoned"))?;
        guard
            .query_row(
                "SELECT id, hash_id, creation_time, start_time, end_time, progress, params, \
                 results, undelegated FROM test_results WHERE hash_id = ?1",
                params![test_id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                        row.get::<_, Option<i64>>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, Option<String>>(7)?,
                        row.get::<_, i64>(8)?,
                    ))
                },
            )
            .optional()
            .map_err(db_err)?
            .map_or_else(
                || Err(BrokerError::user("/test_id", "Unknown test id")),
                |(id, hash_id, creation_time, start_time, end_time, progress, params_json, results_json, undelegated)| {
                    row_to_test_record(
                        id, hash_id, creation_time, start_time, end_time, progress, params_json,
                        results_json, undelegated,
                    )
                },
            )
    }

    fn history(
        &self,
        domain: &str,
        offset: i64,
        limit: i64,
        filter: HistoryFilter,
    ) -> Result<Vec<HistoryEntry>, BrokerError> {
        let guard = self
            .connection
            .lock()
            .map_err(|_| BrokerError::internal("sqlite store mutex poisoned"))?;
        let undelegated_clause = match filter {
            HistoryFilter::All => "",
            HistoryFilter::Delegated => "AND undelegated = 0",
            HistoryFilter::Undelegated => "AND undelegated = 1",
        };
        let sql = format!(
            "SELECT id, creation_time, results, undelegated FROM test_results WHERE domain = ?1 \
             {undelegated_clause} ORDER BY creation_time DESC LIMIT ?2 OFFSET ?3"
        );
        let mut stmt = guard.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params![domain, limit, offset], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })
            .map_err(db_err)?;
        let mut entries = Vec::new();
        for row in rows {
            let (id, creation_time, results_json, undelegated) = row.map_err(db_err)?;
            let results: Option<Value> = results_json
                .map(|raw| serde_json::from_str(&raw))
                .transpose()
                .map_err(|err| BrokerError::internal(format!("corrupt results: {err}")))?;
            entries.push(HistoryEntry {
                id,
                creation_time: format_rfc3339(creation_time)?,
                overall_result: overall_result_of(results.as_ref()),
                undelegated: undelegated != 0,
            });
        }
        Ok(entries)
    }

    fn create_batch(
        &self,
        username: &Username,
        test_params: &TestParams,
        domains: &[String],
    ) -> Result<BatchId, BrokerError> {
        let mut guard = self
            .connection
            .lock()
            .map_err(|_| BrokerError::internal("sqlite store mutex poisoned"))?;
        let tx = guard.transaction().map_err(db_err)?;

        let open_batch: Option<(i64, i64)> = tx
            .query_row(
                "SELECT batch_jobs.id, batch_jobs.creation_time FROM batch_jobs
                 JOIN test_results ON test_results.batch_id = batch_jobs.id
                 WHERE batch_jobs.username = ?1 AND test_results.progress < 100
                 LIMIT 1",
                params![username.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_err)?;
        if let Some((batch_id, creation_time)) = open_batch {
            let creation_time = format_rfc3339(creation_time)?;
            return Err(BrokerError::user_with_data(
                "Batch job still running",
                serde_json::json!({ "batch_id": batch_id, "creation_time": creation_time }),
            ));
        }

        let now = now_unix();
        tx.execute(
            "INSERT INTO batch_jobs (username, creation_time) VALUES (?1, ?2)",
            params![username.as_str(), now],
        )
        .map_err(db_err)?;
        let batch_id = tx.last_insert_rowid();

        for domain in domains {
            let mut per_domain = test_params.clone();
            per_domain.domain = domain.clone();
            per_domain.priority = 5;
            per_domain.queue = 0;
            per_domain.canonicalize_order();
            let fingerprint = zm_broker_core::fingerprint::fingerprint(&per_domain)?;
            let params_json = serde_json::to_string(&per_domain)
                .map_err(|err| BrokerError::internal(format!("serialize params: {err}")))?;
            tx.execute(
                "INSERT INTO test_results
                 (hash_id, fingerprint, domain, batch_id, creation_time, start_time, end_time,
                  progress, params, results, undelegated, priority, queue)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, 0, ?6, NULL, ?7, 5, 0)",
                params![
                    fingerprint.test_id().as_str(),
                    fingerprint.value().cast_signed(),
                    domain,
                    batch_id,
                    now,
                    params_json,
                    i64::from(per_domain.undelegated()),
                ],
            )
            .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)?;
        BatchId::new(batch_id)
    }

    fn batch_status(&self, batch_id: BatchId) -> Result<BatchStatus, BrokerError> {
        let guard = self
            .connection
            .lock()
            .map_err(|_| BrokerError::internal("sqlite store mutex poisoned"))?;
        let nb_running: i64 = guard
            .query_row(
                "SELECT COUNT(*) FROM test_results WHERE batch_id = ?1 AND progress < 100",
                params![batch_id.value()],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        let mut stmt = guard
            .prepare("SELECT hash_id FROM test_results WHERE batch_id = ?1 AND progress = 100")
            .map_err(db_err)?;
        let finished_test_ids = stmt
            .query_map(params![batch_id.value()], |row| row.get::<_, String>(0))
            .map_err(db_err)?
            .map(|raw| raw.map_err(db_err).and_then(|hash_id| TestId::parse(&hash_id)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(BatchStatus {
            nb_running,
            nb_finished: i64::try_from(finished_test_ids.len()).unwrap_or(0),
            finished_test_ids,
        })
    }

    fn add_user(&self, username: &Username, api_key: &str) -> Result<u8, BrokerError> {
        let guard = self
            .connection
            .lock()
            .map_err(|_| BrokerError::internal("sqlite store mutex poisoned"))?;
        let result = guard.execute(
            "INSERT INTO users (username, api_key) VALUES (?1, ?2)",
            params![username.as_str(), api_key],
        );
        match result {
            Ok(_) => Ok(1),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Ok(0)
            }
            Err(err) => Err(db_err(err)),
        }
    }

    fn verify_user(&self, username: &Username, api_key: &str) -> Result<bool, BrokerError> {
        let guard = self
            .connection
            .lock()
            .map_err(|_| BrokerError::internal("sqlite store mutex poisoned"))?;
        let stored: Option<String> = guard
            .query_row(
                "SELECT api_key FROM users WHERE username = ?1",
                params![username.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        let Some(stored) = stored else {
            return Ok(false);
        };
        if stored.len() != api_key.len() {
            return Ok(false);
        }
        Ok(bool::from(stored.as_bytes().ct_eq(api_key.as_bytes())))
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
    use zm_broker_core::NameServer;

    fn params(domain: &str) -> TestParams {
        TestParams {
            domain: domain.to_string(),
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
    fn create_test_dedups_within_reuse_window() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.create_test(&params("zonemaster.net"), 600).unwrap();
        let b = store.create_test(&params("zonemaster.net"), 600).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn create_test_issues_new_id_after_reuse_window_and_completion() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.create_test(&params("zonemaster.net"), 600).unwrap();
        store.set_progress(&a, 100, Some(&serde_json::json!([]))).unwrap();
        let b = store.create_test(&params("zonemaster.net"), -1).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn create_test_reuses_while_still_running_past_window() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.create_test(&params("zonemaster.net"), 600).unwrap();
        // Even with a reuse window that has already elapsed, an unfinished
        // test (progress < 100) must still be reused (§3 invariant 2).
        let b = store.create_test(&params("zonemaster.net"), -1).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn claim_next_never_returns_same_id_twice() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut p = params("zonemaster.net");
        p.queue = 0;
        let id = store.create_test(&p, 600).unwrap();
        let first = store.claim_next(0, 10).unwrap();
        assert_eq!(first, Some(id));
        let second = store.claim_next(0, 10).unwrap();
        assert_eq!(second, None);
    }

    #[test]
    fn claim_next_respects_queue_isolation() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut p0 = params("a.test");
        p0.queue = 0;
        let mut p1 = params("b.test");
        p1.queue = 1;
        let id0 = store.create_test(&p0, 600).unwrap();
        let id1 = store.create_test(&p1, 600).unwrap();
        assert_eq!(store.claim_next(0, 10).unwrap(), Some(id0));
        assert_eq!(store.claim_next(1, 10).unwrap(), Some(id1));
    }

    #[test]
    fn set_progress_is_monotone_and_locks_at_100() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.create_test(&params("zonemaster.net"), 600).unwrap();
        store.set_progress(&id, 50, None).unwrap();
        store.set_progress(&id, 30, None).unwrap();
        let record = store.read_test(&id).unwrap();
        assert_eq!(record.progress, 50);
        store.set_progress(&id, 100, Some(&serde_json::json!([]))).unwrap();
        let record = store.read_test(&id).unwrap();
        assert_eq!(record.progress, 100);
        assert!(record.end_time.is_some());
    }

    #[test]
    fn batch_gating_rejects_second_batch_while_open() {
        let store = SqliteStore::open_in_memory().unwrap();
        let username = Username::parse("alice").unwrap();
        store.add_user(&username, "secret").unwrap();
        let domains = vec!["a.test".to_string(), "b.test".to_string()];
        let first = store.create_batch(&username, &params("placeholder"), &domains).unwrap();
        let err = store
            .create_batch(&username, &params("placeholder"), &["c.test".to_string()])
            .unwrap_err();
        assert!(matches!(err, BrokerError::User { .. }));
        let status = store.batch_status(first).unwrap();
        assert_eq!(status.nb_running, 2);
    }

    #[test]
    fn batch_gating_allows_new_batch_once_previous_completes() {
        let store = SqliteStore::open_in_memory().unwrap();
        let username = Username::parse("alice").unwrap();
        store.add_user(&username, "secret").unwrap();
        let domains = vec!["a.test".to_string()];
        let first = store.create_batch(&username, &params("placeholder"), &domains).unwrap();
        let claimed = store.claim_next(0, 10).unwrap().expect("the only test in the batch");
        store.set_progress(&claimed, 100, Some(&serde_json::json!([]))).unwrap();
        let second = store.create_batch(&username, &params("placeholder"), &domains).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn add_user_is_idempotent_on_conflict() {
        let store = SqliteStore::open_in_memory().unwrap();
        let username = Username::parse("alice").unwrap();
        assert_eq!(store.add_user(&username, "secret").unwrap(), 1);
        assert_eq!(store.add_user(&username, "secret").unwrap(), 0);
        assert_eq!(store.add_user(&username, "other").unwrap(), 0);
    }

    #[test]
    fn verify_user_requires_exact_key_match() {
        let store = SqliteStore::open_in_memory().unwrap();
        let username = Username::parse("alice").unwrap();
        store.add_user(&username, "secret").unwrap();
        assert!(store.verify_user(&username, "secret").unwrap());
        assert!(!store.verify_user(&username, "wrong").unwrap());
        assert!(!store.verify_user(&Username::parse("bob").unwrap(), "secret").unwrap());
    }

    #[test]
    fn history_filters_by_undelegated_flag() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut undelegated = params("a.test");
        undelegated.nameservers = vec![NameServer { ns: "ns1.example.".to_string(), ip: None }];
        store.create_test(&undelegated, 600).unwrap();
        store.create_test(&params("a.test"), 600).unwrap();

        let all = store.history("a.test", 0, 200, HistoryFilter::All).unwrap();
        assert_eq!(all.len(), 2);
        let only_undelegated =
            store.history("a.test", 0, 200, HistoryFilter::Undelegated).unwrap();
        assert_eq!(only_undelegated.len(), 1);
        assert!(only_undelegated[0].undelegated);
        let only_delegated =
            store.history("a.test", 0, 200, HistoryFilter::Delegated).unwrap();
        assert_eq!(only_delegated.len(), 1);
        assert!(!only_delegated[0].undelegated);
    }
}
