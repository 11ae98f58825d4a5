// zm-broker-rpc/src/lib.rs
// ============================================================================
// Module: RPC Surface (C5) and Translator Adapter (C6)
// Description: Method dispatch, privilege checks, and JSON-RPC error mapping
//              over the durable job store; a scoped-locale translator
//              adapter for get_test_results.
// Purpose: Give zm-broker-cli one transport-independent entry point —
//          RpcService::handle — that already knows every method, privilege
//          class, and error-code mapping this broker exposes.
// Dependencies: zm-broker-core, zm-broker-store, serde, serde_json
// ============================================================================

//! ## Overview
//! [`RpcService`] owns method dispatch (§6), the privilege split between
//! Unrestricted and Administrative methods (§4.5), the legacy JSON-RPC error
//! code mapping (§7), and the scoped-locale translator adapter (§4.6). It is
//! deliberately transport-agnostic: [`envelope::JsonRpcRequest`] and
//! [`envelope::JsonRpcResponse`] are plain data, so `zm-broker-cli` is free
//! to serve them over HTTP (or any other transport) without this crate
//! knowing about axum or tokio.

/// The audit sink trait and its three implementations (stderr/file/noop).
pub mod audit;
/// Method dispatch: the thirteen RPC methods and their privilege classes.
pub mod dispatch;
/// JSON-RPC request/response/error envelope types and error-code mapping.
pub mod envelope;
/// A stand-in for the external parent-zone (NS/DS) lookup collaborator.
pub mod parent_zone;
/// Legacy `get_test_results` message rewriting (§4.5).
pub mod rewrite;
/// The C6 translator adapter: scoped process-wide locale guard.
pub mod translate;

pub use audit::AuditEvent;
pub use audit::AuditEventParams;
pub use audit::AuditSink;
pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use dispatch::RpcService;
pub use dispatch::RpcServiceConfig;
pub use envelope::JsonRpcRequest;
pub use envelope::JsonRpcResponse;
pub use envelope::RpcError;
pub use parent_zone::ParentZoneLookup;
pub use parent_zone::ParentZoneResult;
pub use parent_zone::StubParentZoneLookup;
