// zm-broker-store/src/postgres_store.rs
// ============================================================================
// Module: Postgres Job Store
// Description: Client-server relational Store backend (C3), backend A.
// Purpose: Demonstrate the portability contract: same schema semantics as
//          the embedded backend, `SELECT ... FOR UPDATE SKIP LOCKED` instead
//          of a mutex for claim_next's linearizability guarantee (§4.3.3).
// Dependencies: zm-broker-core, postgres, r2d2, r2d2_postgres
// ============================================================================

use std::time::Duration;

use postgres::NoTls;
use postgres::error::SqlState;
use r2d2::Pool;
use r2d2_postgres::PostgresConnectionManager;
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

/// Postgres store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PostgresStoreConfig {
    /// Postgres connection string.
    pub connection: String,
    /// Maximum pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Statement timeout in milliseconds.
    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,
}

const fn default_max_connections() -> u32 {
    16
}

const fn default_connect_timeout_ms() -> u64 {
    5_000
}

const fn default_statement_timeout_ms() -> u64 {
    30_000
}

/// Postgres-backed job store (client-server relational A).
pub struct PostgresStore {
    pool: Pool<PostgresConnectionManager<NoTls>>,
}

impl PostgresStore {
    /// Connects, builds the pool, and runs the schema migration.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Internal` if the connection string is invalid
    /// or the pool/migration cannot be established.
    pub fn new(config: &PostgresStoreConfig) -> Result<Self, BrokerError> {
        let mut pg_config = config
            .connection
            .parse::<postgres::Config>()
            .map_err(|err| BrokerError::internal(format!("postgres config: {err}")))?;
        pg_config.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
        let options = format!("-c statement_timeout={}", config.statement_timeout_ms);
        pg_config.options(&options);
        let manager = PostgresConnectionManager::new(pg_config, NoTls);
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .build(manager)
            .map_err(|err| BrokerError::internal(format!("postgres pool: {err}")))?;
        let store = Self { pool };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), BrokerError> {
        let mut conn = self.pool.get().map_err(db_err)?;
        conn.batch_execute(
            "CREATE TABLE IF NOT EXISTS users (
                id BIGSERIAL PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                api_key TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS batch_jobs (
                id BIGSERIAL PRIMARY KEY,
                username TEXT NOT NULL,
                creation_time TIMESTAMPTZ NOT NULL
            );
            CREATE TABLE IF NOT EXISTS test_results (
                id BIGSERIAL PRIMARY KEY,
                hash_id CHAR(16) NOT NULL UNIQUE,
                fingerprint BIGINT NOT NULL,
                domain TEXT NOT NULL,
                batch_id BIGINT NULL REFERENCES batch_jobs(id),
                creation_time TIMESTAMPTZ NOT NULL,
                start_time TIMESTAMPTZ NULL,
                end_time TIMESTAMPTZ NULL,
                progress INTEGER NOT NULL,
                params JSONB NOT NULL,
                results JSONB NULL,
                undelegated BOOLEAN NOT NULL,
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
}

fn db_err(err: impl std::fmt::Display) -> BrokerError {
    BrokerError::internal(format!("postgres store error: {err}"))
}

fn is_unique_violation(err: &postgres::Error) -> bool {
    err.code() == Some(&SqlState::UNIQUE_VIOLATION)
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

fn format_ts(ts: OffsetDateTime) -> Result<String, BrokerError> {
    ts.format(&Rfc3339).map_err(|err| BrokerError::internal(format!("timestamp format: {err}")))
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

impl Store for PostgresStore {
    fn create_test(&self, params: &TestParams, reuse_window_s: i64) -> Result<TestId, BrokerError> {
        let mut params = params.clone();
        params.canonicalize_order();
        let fingerprint = zm_broker_core::fingerprint::fingerprint(&params)?;
        let fingerprint_key = fingerprint.value().cast_signed();
        let params_json = serde_json::to_value(&params)
            .map_err(|err| BrokerError::internal(format!("serialize params: {err}")))?;

        let mut conn = self.pool.get().map_err(db_err)?;
        let mut tx = conn.transaction().map_err(db_err)?;
        let now = now();
        let cutoff = now - time::Duration::seconds(reuse_window_s);

        let reusable = tx
            .query_opt(
                "SELECT hash_id FROM test_results
                 WHERE fingerprint = $1 AND (creation_time > $2 OR progress < 100)
                 ORDER BY creation_time DESC LIMIT 1",
                &[&fingerprint_key, &cutoff],
            )
            .map_err(db_err)?;
        if let Some(row) = reusable {
            let hash_id: String = row.get(0);
            tx.commit().map_err(db_err)?;
            return TestId::parse(&hash_id);
        }

        let test_id = fingerprint.test_id();
        let insert = tx.execute(
            "INSERT INTO test_results
             (hash_id, fingerprint, domain, batch_id, creation_time, start_time, end_time,
              progress, params, results, undelegated, priority, queue)
             VALUES ($1, $2, $3, NULL, $4, NULL, NULL, 0, $5, NULL, $6, $7, $8)",
            &[
                &test_id.as_str(),
                &fingerprint_key,
                &params.domain,
                &now,
                &params_json,
                &params.undelegated(),
                &params.priority,
                &params.queue,
            ],
        );
        match insert {
            Ok(_) => {
                tx.commit().map_err(db_err)?;
                Ok(test_id)
            }
            Err(err) if is_unique_violation(&err) => {
                let row = tx
                    .query_one(
                        "SELECT hash_id FROM test_results WHERE fingerprint = $1 ORDER BY \
                         creation_time DESC LIMIT 1",
                        &[&fingerprint_key],
                    )
                    .map_err(db_err)?;
                tx.commit().map_err(db_err)?;
                TestId::parse(&row.get::<_, String>(0))
            }
            Err(err) => Err(db_err(err)),
        }
    }

    fn claim_next(&self, queue: i32, max_concurrent: i64) -> Result<Option<TestId>, BrokerError> {
        let mut conn = self.pool.get().map_err(db_err)?;
        let mut tx = conn.transaction().map_err(db_err)?;

        let running: i64 = tx
            .query_one(
                "SELECT COUNT(*) FROM test_results WHERE queue = $1 AND start_time IS NOT NULL \
                 AND progress < 100",
                &[&queue],
            )
            .map_err(db_err)?
            .get(0);
        if running >= max_concurrent {
            tx.commit().map_err(db_err)?;
            return Ok(None);
        }

        let candidate = tx
            .query_opt(
                "SELECT id, hash_id FROM test_results WHERE queue = $1 AND start_time IS NULL \
                 ORDER BY priority DESC, id ASC LIMIT 1 FOR UPDATE SKIP LOCKED",
                &[&queue],
            )
            .map_err(db_err)?;
        let Some(row) = candidate else {
            tx.commit().map_err(db_err)?;
            return Ok(None);
        };
        let id: i64 = row.get(0);
        let hash_id: String = row.get(1);

        tx.execute("UPDATE test_results SET start_time = $1 WHERE id = $2", &[&now(), &id])
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
        let mut conn = self.pool.get().map_err(db_err)?;
        let current: Option<i32> = conn
            .query_opt(
                "SELECT progress FROM test_results WHERE hash_id = $1",
                &[&test_id.as_str()],
            )
            .map_err(db_err)?
            .map(|row| row.get(0));
        let Some(current) = current else {
            return Err(BrokerError::internal("set_progress: unknown test id"));
        };
        if progress <= current {
            return Ok(());
        }
        if progress >= 100 {
            conn.execute(
                "UPDATE test_results SET progress = 100, end_time = $1, results = \
                 COALESCE($2, results) WHERE hash_id = $3",
                &[&now(), &results, &test_id.as_str()],
            )
            .map_err(db_err)?;
        } else {
            conn.execute(
                "UPDATE test_results SET progress = $1 WHERE hash_id = $2",
                &[&progress, &test_id.as_str()],
            )
            .map_err(db_err)?;
        }
        Ok(())
    }

    fn store_results(&self, test_id: &TestId, results: &Value) -> Result<(), BrokerError> {
        let mut conn = self.pool.get().map_err(db_err)?;
        let start_time: Option<Option<OffsetDateTime>> = conn
            .query_opt(
                "SELECT start_time FROM test_results WHERE hash_id = $1",
                &[&test_id.as_str()],
            )
            .map_err(db_err)?
            .map(|row| row.get(0));
        match start_time {
            None => Err(BrokerError::internal("store_results: unknown test id")),
            Some(None) => Err(BrokerError::internal("store_results: test has not been claimed")),
            Some(Some(_)) => {
                conn.execute(
                    "UPDATE test_results SET results = $1 WHERE hash_id = $2",
                    &[&results, &test_id.as_str()],
                )
                .map_err(db_err)?;
                Ok(())
            }
        }
    }

    fn read_test(&self, test_id: &TestId) -> Result<TestRecord, BrokerError> {
        let mut conn = self.pool.get().map_err(db_err)?;
        let row = conn
            .query_opt(
                "SELECT id, hash_id, creation_time, start_time, end_time, progress, params, \
                 results, undelegated FROM test_results WHERE hash_id = $1",
                &[&test_id.as_str()],
            )
            .map_err(db_err)?;
        let Some(row) = row else {
            return Err(BrokerError::user("/test_id", "Unknown test id"));
        };
        let hash_id: String = row.get(1);
        let creation_time: OffsetDateTime = row.get(2);
        let start_time: Option<OffsetDateTime> = row.get(3);
        let end_time: Option<OffsetDateTime> = row.get(4);
        Ok(TestRecord {
            test_id: TestId::parse(&hash_id)?,
            id: row.get(0),
            creation_time: format_ts(creation_time)?,
            start_time: start_time.map(format_ts).transpose()?,
            end_time: end_time.map(format_ts).transpose()?,
            progress: row.get(5),
            params: row.get(6),
            results: row.get(7),
            undelegated: row.get(8),
        })
    }

    fn history(
        &self,
        domain: &str,
        offset: i64,
        limit: i64,
        filter: HistoryFilter,
    ) -> Result<Vec<HistoryEntry>, BrokerError> {
        let mut conn = self.pool.get().map_err(db_err)?;
        let undelegated_clause = match filter {
            HistoryFilter::All => "",
            HistoryFilter::Delegated => "AND undelegated = false",
            HistoryFilter::Undelegated => "AND undelegated = true",
        };
        let sql = format!(
            "SELECT id, creation_time, results, undelegated FROM test_results WHERE domain = $1 \
             {undelegated_clause} ORDER BY creation_time DESC LIMIT $2 OFFSET $3"
        );
        let rows = conn.query(&sql, &[&domain, &limit, &offset]).map_err(db_err)?;
        rows.into_iter()
            .map(|row| {
                let creation_time: OffsetDateTime = row.get(1);
                let results: Option<Value> = row.get(2);
                Ok(HistoryEntry {
                    id: row.get(0),
                    creation_time: format_ts(creation_time)?,
                    overall_result: overall_result_of(results.as_ref()),
                    undelegated: row.get(3),
                })
            })
            .collect()
    }

    fn create_batch(
        &self,
        username: &Username,
        test_params: &TestParams,
        domains: &[String],
    ) -> Result<BatchId, BrokerError> {
        let mut conn = self.pool.get().map_err(db_err)?;
        let mut tx = conn.transaction().map_err(db_err)?;

        let open_batch = tx
            .query_opt(
                "SELECT batch_jobs.id, batch_jobs.creation_time FROM batch_jobs
                 JOIN test_results ON test_results.batch_id = batch_jobs.id
                 WHERE batch_jobs.username = $1 AND test_results.progress < 100
                 LIMIT 1",
                &[&username.as_str()],
            )
            .map_err(db_err)?;
        if let Some(row) = open_batch {
            let batch_id: i64 = row.get(0);
            let creation_time: OffsetDateTime = row.get(1);
            return Err(BrokerError::user_with_data(
                "Batch job still running",
                serde_json::json!({ "batch_id": batch_id, "creation_time": format_ts(creation_time)? }),
            ));
        }

        let now = now();
        let row = tx
            .query_one(
                "INSERT INTO batch_jobs (username, creation_time) VALUES ($1, $2) RETURNING id",
                &[&username.as_str(), &now],
            )
            .map_err(db_err)?;
        let batch_id: i64 = row.get(0);

        for domain in domains {
            let mut per_domain = test_params.clone();
            per_domain.domain = domain.clone();
            per_domain.priority = 5;
            per_domain.queue = 0;
            per_domain.canonicalize_order();
            let fingerprint = zm_broker_core::fingerprint::fingerprint(&per_domain)?;
            let params_json = serde_json::to_value(&per_domain)
                .map_err(|err| BrokerError::internal(format!("serialize params: {err}")))?;
            tx.execute(
                "INSERT INTO test_results
                 (hash_id, fingerprint, domain, batch_id, creation_time, start_time, end_time,
                  progress, params, results, undelegated, priority, queue)
                 VALUES ($1, $2, $3, $4, $5, NULL, NULL, 0, $6, NULL, $7, 5, 0)",
                &[
                    &fingerprint.test_id().as_str(),
                    &fingerprint.value().cast_signed(),
                    domain,
                    &batch_id,
                    &now,
                    &params_json,
                    &per_domain.undelegated(),
                ],
            )
            .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)?;
        BatchId::new(batch_id)
    }

    fn batch_status(&self, batch_id: BatchId) -> Result<BatchStatus, BrokerError> {
        let mut conn = self.pool.get().map_err(db_err)?;
        let nb_running: i64 = conn
            .query_one(
                "SELECT COUNT(*) FROM test_results WHERE batch_id = $1 AND progress < 100",
                &[&batch_id.value()],
            )
            .map_err(db_err)?
            .get(0);
        let rows = conn
            .query(
                "SELECT hash_id FROM test_results WHERE batch_id = $1 AND progress = 100",
                &[&batch_id.value()],
            )
            .map_err(db_err)?;
        let finished_test_ids = rows
            .into_iter()
            .map(|row| TestId::parse(&row.get::<_, String>(0)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(BatchStatus {
            nb_running,
            nb_finished: i64::try_from(finished_test_ids.len()).unwrap_or(0),
            finished_test_ids,
        })
    }

    fn add_user(&self, username: &Username, api_key: &str) -> Result<u8, BrokerError> {
        let mut conn = self.pool.get().map_err(db_err)?;
        let result = conn.execute(
            "INSERT INTO users (username, api_key) VALUES ($1, $2)",
            &[&username.as_str(), &api_key],
        );
        match result {
            Ok(_) => Ok(1),
            Err(err) if is_unique_violation(&err) => Ok(0),
            Err(err) => Err(db_err(err)),
        }
    }

    fn verify_user(&self, username: &Username, api_key: &str) -> Result<bool, BrokerError> {
        let mut conn = self.pool.get().map_err(db_err)?;
        let stored: Option<String> = conn
            .query_opt("SELECT api_key FROM users WHERE username = $1", &[&username.as_str()])
            .map_err(db_err)?
            .map(|row| row.get(0));
        let Some(stored) = stored else {
            return Ok(false);
        };
        if stored.len() != api_key.len() {
            return Ok(false);
        }
        Ok(bool::from(stored.as_bytes().ct_eq(api_key.as_bytes())))
    }
}
