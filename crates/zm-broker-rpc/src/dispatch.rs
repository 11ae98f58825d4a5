// zm-broker-rpc/src/dispatch.rs
// ============================================================================
// Module: RPC Method Dispatch (C5)
// Description: The thirteen RPC methods, their privilege classes, and the
//              glue between the Validator (C1), the Store (C3), and the
//              Translator adapter (C6).
// Purpose: Give zm-broker-cli a single synchronous entry point —
//          RpcService::handle — that already knows every method this
//          broker exposes (§6).
// Dependencies: zm-broker-core, zm-broker-store, serde_json
// ============================================================================

//! ## Overview
//! [`RpcService::handle`] is the transport-independent call this crate
//! exists to provide: given a parsed [`JsonRpcRequest`] and the caller's
//! remote address, it runs the privilege check (§4.5), dispatches to one of
//! the thirteen methods in §6, and shapes the outcome into a
//! [`JsonRpcResponse`] through [`crate::envelope`]'s error-code mapping.
//! Every method that needs the locale goes through
//! [`crate::translate::with_locale`]; every call is recorded through the
//! configured [`AuditSink`].

use std::net::IpAddr;
use std::net::SocketAddr;
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use serde_json::json;
use zm_broker_core::BatchId;
use zm_broker_core::BrokerError;
use zm_broker_core::TestId;
use zm_broker_core::Username;
use zm_broker_core::Validator;
use zm_broker_core::i18n;
use zm_broker_store::HistoryFilter;
use zm_broker_store::Store;

use crate::audit::AuditEvent;
use crate::audit::AuditEventParams;
use crate::audit::AuditSink;
use crate::envelope::JsonRpcRequest;
use crate::envelope::JsonRpcResponse;
use crate::envelope::RpcError;
use crate::envelope::to_response;
use crate::parent_zone::ParentZoneLookup;
use crate::rewrite;
use crate::translate;

/// Zonemaster-compatible version strings returned by `version_info` (§6).
/// These are display strings, not semver of this crate.
const ZONEMASTER_BACKEND_VERSION: &str = "broker-1.0";
const ZONEMASTER_ENGINE_VERSION: &str = "engine-external";

/// Default `add_batch_job` priority and queue (§6).
const BATCH_DEFAULT_PRIORITY: i32 = 5;
const BATCH_DEFAULT_QUEUE: i32 = 0;

/// Default `get_test_history` offset/limit (§4.3.2).
const DEFAULT_HISTORY_OFFSET: i64 = 0;
const DEFAULT_HISTORY_LIMIT: i64 = 200;

/// Methods gated by `RPCAPI.enable_add_api_user` / `enable_add_batch_job`
/// (§6, §7): disabled methods respond as if unknown.
fn is_rpcapi_disabled(method: &str, config: &RpcServiceConfig) -> bool {
    match method {
        "add_api_user" => !config.enable_add_api_user,
        "add_batch_job" => !config.enable_add_batch_job,
        _ => false,
    }
}

/// Administrative methods, reachable only from a loopback caller (§4.5).
fn is_administrative(method: &str) -> bool {
    method == "add_api_user"
}

/// `true` iff `ip` is one of `127.0.0.1`, `::1`, or `::ffff:127.0.0.1`
/// (§4.5).
#[must_use]
pub fn is_loopback_admin(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => v6.is_loopback() || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback()),
    }
}

/// The subset of [`zm_broker_config::config::BrokerConfig`] the RPC layer
/// needs, passed in directly so this crate never depends on
/// `zm-broker-config` (keeping the dependency graph acyclic: config depends
/// on store, rpc depends on store and core only).
#[derive(Debug, Clone)]
pub struct RpcServiceConfig {
    /// Fingerprint reuse window, `ZONEMASTER.age_reuse_previous_test` (§3).
    pub reuse_window_s: i64,
    /// `RPCAPI.enable_add_api_user`.
    pub enable_add_api_user: bool,
    /// `RPCAPI.enable_add_batch_job`.
    pub enable_add_batch_job: bool,
}

/// The RPC surface (C5): method dispatch over a [`Store`], using a
/// [`Validator`], an [`AuditSink`], and a [`ParentZoneLookup`].
pub struct RpcService {
    store: Arc<dyn Store>,
    validator: Validator,
    audit: Arc<dyn AuditSink>,
    parent_zone: Arc<dyn ParentZoneLookup>,
    config: RpcServiceConfig,
}

impl RpcService {
    /// Builds the service from its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        validator: Validator,
        audit: Arc<dyn AuditSink>,
        parent_zone: Arc<dyn ParentZoneLookup>,
        config: RpcServiceConfig,
    ) -> Self {
        Self { store, validator, audit, parent_zone, config }
    }

    /// Handles one JSON-RPC request, producing a response that is always
    /// well-formed (never panics, never propagates an error past this call,
    /// §4.5, §7).
    #[must_use]
    pub fn handle(&self, request: JsonRpcRequest, remote_ip: IpAddr) -> JsonRpcResponse {
        let started = Instant::now();
        let method = request.method.clone();
        let outcome = match &method {
            None => Err(RpcError::method_not_found()),
            Some(method) => self.dispatch(method, request.params.as_ref(), remote_ip),
        };
        let duration_us = started.elapsed().as_micros();
        self.audit.record(&AuditEvent::new(AuditEventParams {
            request_id: request.id.to_string(),
            method,
            remote_ip: remote_ip.to_string(),
            outcome: if outcome.is_ok() { "ok" } else { "error" },
            error_code: outcome.as_ref().err().map(|e| e.code),
            error_severity: outcome.as_ref().err().is_some_and(|e| e.error_severity),
            duration_us,
        }));
        to_response(request.id, outcome)
    }

    fn dispatch(&self, method: &str, params: Option<&Value>, remote_ip: IpAddr) -> Result<Value, RpcError> {
        if is_rpcapi_disabled(method, &self.config) {
            return Err(RpcError::method_not_found());
        }
        if is_administrative(method) && !is_loopback_admin(remote_ip) {
            return Err(RpcError::permission_denied(&remote_ip.to_string()));
        }

        match method {
            "version_info" => Ok(self.version_info()),
            "profile_names" => Ok(self.profile_names()),
            "get_language_tags" => Ok(self.get_language_tags()),
            "get_host_by_name" => self.get_host_by_name(params),
            "get_data_from_parent_zone" => self.get_data_from_parent_zone(params),
            "start_domain_test" => self.start_domain_test(params),
            "test_progress" => self.test_progress(params),
            "get_test_results" => self.get_test_results(params),
            "get_test_history" => self.get_test_history(params),
            "get_test_params" => self.get_test_params(params),
            "add_api_user" => self.add_api_user(params),
            "add_batch_job" => self.add_batch_job(params),
            "get_batch_job_result" => self.get_batch_job_result(params),
            _ => Err(RpcError::method_not_found()),
        }
    }

    fn version_info(&self) -> Value {
        json!({
            "zonemaster_backend": ZONEMASTER_BACKEND_VERSION,
            "zonemaster_engine": ZONEMASTER_ENGINE_VERSION,
        })
    }

    fn profile_names(&self) -> Value {
        Value::Array(self.validator.profile_names().map(Value::String).collect())
    }

    fn get_language_tags(&self) -> Value {
        Value::Array(self.validator.language_tags().into_iter().map(Value::String).collect())
    }

    fn get_host_by_name(&self, params: Option<&Value>) -> Result<Value, RpcError> {
        let hostname = require_string_field(params, "hostname").map_err(RpcError::from_validation_error)?;
        let addresses: Vec<String> = (hostname.as_str(), 0u16)
            .to_socket_addrs()
            .map(|iter| iter.map(|addr: SocketAddr| addr.ip().to_string()).collect())
            .unwrap_or_default();
        if addresses.is_empty() {
            return Ok(json!([{ hostname.clone(): "0.0.0.0" }]));
        }
        Ok(Value::Array(addresses.into_iter().map(|ip| json!({ hostname.clone(): ip })).collect()))
    }

    fn get_data_from_parent_zone(&self, params: Option<&Value>) -> Result<Value, RpcError> {
        let domain = require_string_field(params, "domain").map_err(RpcError::from_validation_error)?;
        let result = self.parent_zone.lookup(&domain);
        Ok(json!({ "ns_list": result.ns_list, "ds_list": result.ds_list }))
    }

    fn start_domain_test(&self, params: Option<&Value>) -> Result<Value, RpcError> {
        let raw = params.cloned().unwrap_or(Value::Null);
        let test_params =
            self.validator.validate_start_domain_test(&raw).map_err(RpcError::from_validation_error)?;
        let test_id = self
            .store
            .create_test(&test_params, self.config.reuse_window_s)
            .map_err(RpcError::from_broker_error)?;
        Ok(json!(test_id.as_str()))
    }

    fn test_progress(&self, params: Option<&Value>) -> Result<Value, RpcError> {
        let test_id = require_test_id(params)?;
        let record = self.store.read_test(&test_id).map_err(RpcError::from_broker_error)?;
        Ok(json!(record.progress))
    }

    fn get_test_results(&self, params: Option<&Value>) -> Result<Value, RpcError> {
        let obj = params.and_then(Value::as_object);
        let test_id = require_test_id(params)?;
        let language = obj.and_then(|o| o.get("language")).and_then(Value::as_str).unwrap_or("").to_string();

        let record = self.store.read_test(&test_id).map_err(RpcError::from_broker_error)?;

        // Results are readable only once the test has finished (§3 invariant
        // 4); a Running test's `results` column may already hold a partial
        // document written by `store_results`, but callers must see an
        // empty list and the in-flight params until progress reaches 100.
        let raw_entries = if record.progress >= 100 {
            record.results.as_ref().and_then(Value::as_array).cloned().unwrap_or_default()
        } else {
            Vec::new()
        };
        let entries = translate::with_locale(&language, || build_result_entries(&raw_entries, &language))
            .map_err(RpcError::from_broker_error)?;

        Ok(json!({
            "creation_time": record.creation_time,
            "id": record.id,
            "hash_id": test_id.as_str(),
            "params": record.params,
            "results": entries,
        }))
    }

    fn get_test_history(&self, params: Option<&Value>) -> Result<Value, RpcError> {
        let obj = params.and_then(Value::as_object);
        let offset = obj
            .and_then(|o| o.get("offset"))
            .and_then(zm_broker_core::validate::coerce_int_loose)
            .unwrap_or(DEFAULT_HISTORY_OFFSET);
        let limit = obj
            .and_then(|o| o.get("limit"))
            .and_then(zm_broker_core::validate::coerce_int_loose)
            .unwrap_or(DEFAULT_HISTORY_LIMIT);
        let filter = obj
            .and_then(|o| o.get("filter"))
            .and_then(Value::as_str)
            .map_or(HistoryFilter::All, parse_history_filter);
        let domain = obj
            .and_then(|o| o.get("frontend_params"))
            .and_then(Value::as_object)
            .and_then(|o| o.get("domain"))
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::from_validation_error(BrokerError::user("/frontend_params/domain", "domain is required")))?;

        let entries =
            self.store.history(domain, offset, limit, filter).map_err(RpcError::from_broker_error)?;
        Ok(Value::Array(
            entries
                .into_iter()
                .map(|entry| {
                    json!({
                        "id": entry.id,
                        "creation_time": entry.creation_time,
                        "overall_result": entry.overall_result,
                        "undelegated": entry.undelegated,
                    })
                })
                .collect(),
        ))
    }

    fn get_test_params(&self, params: Option<&Value>) -> Result<Value, RpcError> {
        let test_id = require_test_id(params)?;
        let record = self.store.read_test(&test_id).map_err(RpcError::from_broker_error)?;
        Ok(record.params)
    }

    fn add_api_user(&self, params: Option<&Value>) -> Result<Value, RpcError> {
        let obj = params.and_then(Value::as_object).ok_or_else(|| {
            RpcError::from_validation_error(BrokerError::user_message("params must be a JSON object"))
        })?;
        let username = obj
            .get("username")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::from_validation_error(BrokerError::user("/username", "username is required")))?;
        let api_key = obj
            .get("api_key")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::from_validation_error(BrokerError::user("/api_key", "api_key is required")))?;
        let username = Username::parse(username).map_err(RpcError::from_validation_error)?;
        zm_broker_core::ApiKey::parse(api_key).map_err(RpcError::from_validation_error)?;

        let created = self.store.add_user(&username, api_key).map_err(RpcError::from_broker_error)?;
        Ok(json!(created))
    }

    fn add_batch_job(&self, params: Option<&Value>) -> Result<Value, RpcError> {
        let obj = params.and_then(Value::as_object).ok_or_else(|| {
            RpcError::from_validation_error(BrokerError::user_message("params must be a JSON object"))
        })?;
        let username = obj
            .get("username")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::from_validation_error(BrokerError::user("/username", "username is required")))?;
        let api_key = obj
            .get("api_key")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::from_validation_error(BrokerError::user("/api_key", "api_key is required")))?;
        let domains: Vec<String> = obj
            .get("domains")
            .and_then(Value::as_array)
            .ok_or_else(|| RpcError::from_validation_error(BrokerError::user("/domains", "domains is required")))?
            .iter()
            .filter_map(|d| d.as_str().map(str::to_string))
            .collect();

        let username = Username::parse(username).map_err(RpcError::from_validation_error)?;
        let mut test_params = self
            .validator
            .validate_batch_test_params(obj.get("test_params"))
            .map_err(RpcError::from_validation_error)?;
        test_params.priority = BATCH_DEFAULT_PRIORITY;
        test_params.queue = BATCH_DEFAULT_QUEUE;

        let verified = self.store.verify_user(&username, api_key).map_err(RpcError::from_broker_error)?;
        if !verified {
            return Err(RpcError::from_broker_error(BrokerError::user_with_data(
                "Unknown user or wrong credentials",
                json!({ "username": username.as_str() }),
            )));
        }

        let batch_id = self
            .store
            .create_batch(&username, &test_params, &domains)
            .map_err(RpcError::from_broker_error)?;
        Ok(json!(batch_id.value()))
    }

    fn get_batch_job_result(&self, params: Option<&Value>) -> Result<Value, RpcError> {
        let obj = params.and_then(Value::as_object);
        let raw_id = obj
            .and_then(|o| o.get("batch_id"))
            .and_then(zm_broker_core::validate::coerce_int_loose)
            .ok_or_else(|| RpcError::from_validation_error(BrokerError::user("/batch_id", "batch_id is required")))?;
        let batch_id = BatchId::new(raw_id).map_err(RpcError::from_validation_error)?;
        let status = self.store.batch_status(batch_id).map_err(RpcError::from_broker_error)?;
        Ok(json!({
            "nb_finished": status.nb_finished,
            "nb_running": status.nb_running,
            "finished_test_ids": status.finished_test_ids.iter().map(TestId::as_str).collect::<Vec<_>>(),
        }))
    }
}

fn require_string_field(params: Option<&Value>, field: &str) -> Result<String, BrokerError> {
    params
        .and_then(Value::as_object)
        .and_then(|o| o.get(field))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BrokerError::user(&format!("/{field}"), format!("{field} is required")))
}

fn require_test_id(params: Option<&Value>) -> Result<TestId, RpcError> {
    let raw = require_string_field(params, "test_id")
        .or_else(|_| require_string_field(params, "id"))
        .map_err(RpcError::from_validation_error)?;
    TestId::parse(&raw).map_err(RpcError::from_validation_error)
}

fn parse_history_filter(raw: &str) -> HistoryFilter {
    match raw {
        "delegated" => HistoryFilter::Delegated,
        "undelegated" => HistoryFilter::Undelegated,
        _ => HistoryFilter::All,
    }
}

/// Translates, rewrites, and drops result entries per §4.5's legacy
/// post-processing rules. Entries missing `module`/`tag`/`args` pass
/// through with empty defaults rather than being dropped, since the result
/// document is produced by an external, untyped collaborator.
fn build_result_entries(raw_entries: &[Value], language: &str) -> Value {
    let mut out = Vec::with_capacity(raw_entries.len());
    for entry in raw_entries {
        let module = entry.get("module").and_then(Value::as_str).unwrap_or_default();
        let tag = entry.get("tag").and_then(Value::as_str).unwrap_or_default();
        let args = entry.get("args").cloned().unwrap_or(Value::Null);
        if rewrite::is_dropped_system_example(module, tag, &args) {
            continue;
        }
        let level = entry.get("level").and_then(Value::as_str).unwrap_or_default();
        let Some(_) = zm_broker_core::Level::from_engine_tag(level) else {
            continue;
        };
        let message = translate::translate_message(module, tag, &args, language);
        let message = rewrite::apply_legacy_rewrites(&message);
        let mut shaped = json!({ "module": module, "message": message, "level": level });
        if let Some(ns) = entry.get("ns") {
            shaped["ns"] = ns.clone();
        }
        out.push(shaped);
    }
    Value::Array(out)
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use std::net::Ipv4Addr;
    use std::net::Ipv6Addr;

    use zm_broker_core::LocaleTag;
    use zm_broker_store::SqliteStore;

    use super::*;
    use crate::audit::NoopAuditSink;
    use crate::envelope::INTERNAL_ERROR;
    use crate::envelope::INVALID_PARAMS;
    use crate::envelope::METHOD_NOT_FOUND;
    use crate::parent_zone::StubParentZoneLookup;

    fn service() -> RpcService {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let validator = Validator::new(
            ["default".to_string()],
            vec![LocaleTag { short: "en".to_string(), full: "en_US".to_string() }],
        );
        RpcService::new(
            store,
            validator,
            Arc::new(NoopAuditSink),
            Arc::new(StubParentZoneLookup),
            RpcServiceConfig { reuse_window_s: 600, enable_add_api_user: true, enable_add_batch_job: true },
        )
    }

    fn call(service: &RpcService, method: &str, params: Value, remote_ip: IpAddr) -> JsonRpcResponse {
        let request = JsonRpcRequest { id: json!(1), method: Some(method.to_string()), params: Some(params) };
        service.handle(request, remote_ip)
    }

    const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));

    #[test]
    fn version_info_reports_both_version_strings() {
        let service = service();
        let response = call(&service, "version_info", json!({}), LOOPBACK);
        let result = response.result.unwrap();
        assert!(result["zonemaster_backend"].is_string());
        assert!(result["zonemaster_engine"].is_string());
    }

    #[test]
    fn profile_names_always_contains_default() {
        let service = service();
        let response = call(&service, "profile_names", json!({}), LOOPBACK);
        let names = response.result.unwrap();
        assert!(names.as_array().unwrap().iter().any(|v| v == "default"));
    }

    #[test]
    fn unknown_method_maps_to_method_not_found() {
        let service = service();
        let response = call(&service, "no_such_method", json!({}), LOOPBACK);
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[test]
    fn invalid_domain_maps_to_invalid_params_with_pointer_data() {
        let service = service();
        let response = call(&service, "start_domain_test", json!({ "domain": "ex ample.com" }), LOOPBACK);
        let error = response.error.unwrap();
        assert_eq!(error.code, INVALID_PARAMS);
        let data = error.data.unwrap();
        assert_eq!(data[0]["path"], "/domain");
        assert_eq!(data[0]["message"], "The domain name character(s) are not supported");
    }

    #[test]
    fn round_trip_through_progress_and_results() {
        let service = service();
        let start = call(&service, "start_domain_test", json!({ "domain": "zonemaster.net" }), LOOPBACK);
        let test_id = start.result.unwrap().as_str().unwrap().to_string();

        let progress = call(&service, "test_progress", json!({ "test_id": test_id }), LOOPBACK);
        assert_eq!(progress.result.unwrap(), 0);

        let results = call(&service, "get_test_results", json!({ "id": test_id, "language": "" }), LOOPBACK);
        assert_eq!(results.result.unwrap()["results"], json!([]));

        service
            .store
            .set_progress(
                &TestId::parse(&test_id).unwrap(),
                100,
                Some(&json!([
                    { "module": "SYSTEM", "tag": "POLICY_DISABLED", "args": {"name": "Example"}, "level": "WARNING" },
                    { "module": "NAMESERVER", "tag": "N01", "args": {}, "ns": "ns1.zonemaster.net", "level": "WARNING" },
                ])),
            )
            .unwrap();

        let results = call(&service, "get_test_results", json!({ "id": test_id, "language": "" }), LOOPBACK);
        let entries = results.result.unwrap()["results"].as_array().unwrap().clone();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["module"], "NAMESERVER");

        let history = call(
            &service,
            "get_test_history",
            json!({ "frontend_params": { "domain": "zonemaster.net" } }),
            LOOPBACK,
        );
        let history = history.result.unwrap();
        assert_eq!(history[0]["overall_result"], "warning");
    }

    #[test]
    fn dedup_returns_same_id_until_window_and_completion() {
        let service = service();
        let a = call(&service, "start_domain_test", json!({ "domain": "zonemaster.net", "ipv4": true }), LOOPBACK);
        let b = call(&service, "start_domain_test", json!({ "domain": "zonemaster.net", "ipv4": true }), LOOPBACK);
        assert_eq!(a.result, b.result);
    }

    #[test]
    fn batch_gating_rejects_new_batch_while_one_is_open() {
        let service = service();
        let created = call(&service, "add_api_user", json!({ "username": "alice", "api_key": "secret" }), LOOPBACK);
        assert_eq!(created.result.unwrap(), 1);

        let batch = call(
            &service,
            "add_batch_job",
            json!({ "username": "alice", "api_key": "secret", "domains": ["a.test", "b.test"] }),
            LOOPBACK,
        );
        assert_eq!(batch.result.unwrap(), 1);

        let second = call(
            &service,
            "add_batch_job",
            json!({ "username": "alice", "api_key": "secret", "domains": ["c.test"] }),
            LOOPBACK,
        );
        let error = second.error.unwrap();
        assert_eq!(error.code, INTERNAL_ERROR);
        assert_eq!(error.data.unwrap()["batch_id"], 1);
    }

    #[test]
    fn admin_method_denied_from_non_loopback_caller() {
        let service = service();
        let remote = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let response = call(&service, "add_api_user", json!({ "username": "bob", "api_key": "secret" }), remote);
        let error = response.error.unwrap();
        assert_eq!(error.code, INTERNAL_ERROR);
        assert_eq!(error.data.unwrap()["remote_ip"], "10.0.0.1");
    }

    #[test]
    fn admin_method_allowed_from_loopback_v6() {
        let service = service();
        let remote = IpAddr::V6(Ipv6Addr::LOCALHOST);
        let response = call(&service, "add_api_user", json!({ "username": "carol", "api_key": "secret" }), remote);
        assert_eq!(response.result.unwrap(), 1);
    }

    #[test]
    fn disabled_rpcapi_method_behaves_as_unknown() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let validator = Validator::new(["default".to_string()], vec![]);
        let service = RpcService::new(
            store,
            validator,
            Arc::new(NoopAuditSink),
            Arc::new(StubParentZoneLookup),
            RpcServiceConfig { reuse_window_s: 600, enable_add_api_user: false, enable_add_batch_job: true },
        );
        let response = call(&service, "add_api_user", json!({ "username": "dan", "api_key": "secret" }), LOOPBACK);
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[test]
    fn queue_isolation_is_preserved_through_claim_next() {
        let service = service();
        call(&service, "start_domain_test", json!({ "domain": "a.test", "queue": 0 }), LOOPBACK);
        call(&service, "start_domain_test", json!({ "domain": "b.test", "queue": 1 }), LOOPBACK);
        let claimed_q0 = service.store.claim_next(0, 10).unwrap();
        let claimed_q1 = service.store.claim_next(1, 10).unwrap();
        assert!(claimed_q0.is_some());
        assert!(claimed_q1.is_some());
        assert_ne!(claimed_q0, claimed_q1);
    }

    #[test]
    fn results_written_while_running_are_not_visible_before_progress_100() {
        let service = service();
        let start = call(&service, "start_domain_test", json!({ "domain": "zonemaster.net" }), LOOPBACK);
        let test_id = TestId::parse(start.result.unwrap().as_str().unwrap()).unwrap();

        service.store.claim_next(0, 10).unwrap();
        service
            .store
            .store_results(
                &test_id,
                &json!([{ "module": "NAMESERVER", "tag": "N01", "args": {}, "level": "WARNING" }]),
            )
            .unwrap();

        let results = call(&service, "get_test_results", json!({ "id": test_id.as_str(), "language": "" }), LOOPBACK);
        assert_eq!(results.result.unwrap()["results"], json!([]));

        service.store.set_progress(&test_id, 100, None).unwrap();
        let results = call(&service, "get_test_results", json!({ "id": test_id.as_str(), "language": "" }), LOOPBACK);
        assert_eq!(results.result.unwrap()["results"].as_array().unwrap().len(), 1);
    }
}
