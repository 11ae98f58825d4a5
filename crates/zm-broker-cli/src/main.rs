// zm-broker-cli/src/main.rs
// ============================================================================
// Module: Broker CLI Entry Point
// Description: Command dispatcher for serving the JSON-RPC surface and
//              local administration tasks (registering API users).
// Purpose: Load configuration, build the configured Store backend and
//          Validator, and wire the audit sink, exactly as the teacher's
//          CLI crate assembles its own MCP server from config.
// Dependencies: clap, tokio, zm-broker-config, zm-broker-core,
//               zm-broker-rpc, zm-broker-store
// ============================================================================

//! ## Overview
//! Two subcommands: `serve` starts the HTTP JSON-RPC listener, and
//! `add-user` performs the `add_api_user` operation directly against the
//! configured store without going over the wire (a local administration
//! convenience; the loopback-only RPC method remains the normal path for a
//! remote operator, per §4.5).

mod server;

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use zm_broker_config::BrokerConfig;
use zm_broker_core::ApiKey;
use zm_broker_core::Username;
use zm_broker_rpc::AuditSink;
use zm_broker_rpc::FileAuditSink;
use zm_broker_rpc::NoopAuditSink;
use zm_broker_rpc::RpcService;
use zm_broker_rpc::RpcServiceConfig;
use zm_broker_rpc::StderrAuditSink;
use zm_broker_rpc::StubParentZoneLookup;
use zm_broker_store::Store;

/// Test Request Broker: validates, deduplicates, and dispatches DNS health
/// tests to external test agents over a durable, pluggable job store.
#[derive(Parser, Debug)]
#[command(name = "zm-broker", disable_help_subcommand = true)]
struct Cli {
    /// Path to the TOML configuration file (defaults to `ZM_BROKER_CONFIG`
    /// or `./zm-broker.toml`, see `zm_broker_config::config`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the JSON-RPC HTTP listener.
    Serve {
        /// Overrides the `[SERVER].bind` address from the config file.
        #[arg(long)]
        bind: Option<String>,
        /// Where to send the per-call audit events.
        #[arg(long, value_enum, default_value = "stderr")]
        audit: AuditKind,
        /// Path for `--audit file`; required in that mode.
        #[arg(long)]
        audit_path: Option<PathBuf>,
    },
    /// Register a batch user directly against the configured store,
    /// without requiring a loopback `add_api_user` RPC call.
    AddUser {
        /// Username matching `^[A-Za-z0-9.\-@]{1,50}$`.
        username: String,
        /// Api key matching `^[A-Za-z0-9_\-]{1,512}$`.
        api_key: String,
    },
    /// Print the configured backend and reuse window, then exit.
    ShowConfig,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum AuditKind {
    /// One JSON line per RPC call, written to stderr.
    Stderr,
    /// One JSON line per RPC call, appended to `--audit-path`.
    File,
    /// Discard every audit event.
    Noop,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let _ = writeln!(std::io::stderr(), "zm-broker: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Writes a single line to stdout (direct `io::Write` rather than
/// `println!`, per the workspace's `clippy::print_stdout` lint).
fn write_line(message: &str) {
    let _ = writeln!(std::io::stdout(), "{message}");
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] zm_broker_config::ConfigError),
    #[error("{0}")]
    Broker(#[from] zm_broker_core::BrokerError),
    #[error("audit log: {0}")]
    Audit(#[from] std::io::Error),
    #[error("server: {0}")]
    Server(#[from] server::ServerError),
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Serve { bind, audit, audit_path } => {
            serve(cli.config.as_deref(), bind, audit, audit_path).await
        }
        Command::AddUser { username, api_key } => add_user(cli.config.as_deref(), &username, &api_key),
        Command::ShowConfig => show_config(cli.config.as_deref()),
    }
}

fn build_audit_sink(kind: AuditKind, path: Option<PathBuf>) -> Result<Arc<dyn AuditSink>, CliError> {
    match kind {
        AuditKind::Stderr => Ok(Arc::new(StderrAuditSink)),
        AuditKind::Noop => Ok(Arc::new(NoopAuditSink)),
        AuditKind::File => {
            let path = path.ok_or_else(|| {
                CliError::Audit(std::io::Error::other("--audit-path is required with --audit file"))
            })?;
            Ok(Arc::new(FileAuditSink::new(&path)?))
        }
    }
}

async fn serve(
    config_path: Option<&std::path::Path>,
    bind_override: Option<String>,
    audit_kind: AuditKind,
    audit_path: Option<PathBuf>,
) -> Result<(), CliError> {
    let config = BrokerConfig::load(config_path)?;
    let store = config.build_store()?;
    let validator = config.build_validator()?;
    let audit = build_audit_sink(audit_kind, audit_path)?;
    let rpc_config = RpcServiceConfig {
        reuse_window_s: config.zonemaster.age_reuse_previous_test,
        enable_add_api_user: config.rpcapi.enable_add_api_user,
        enable_add_batch_job: config.rpcapi.enable_add_batch_job,
    };
    let service = Arc::new(RpcService::new(store, validator, audit, Arc::new(StubParentZoneLookup), rpc_config));

    let bind = bind_override
        .map_or_else(
            || config.server.socket_addr(),
            |raw| {
                raw.parse()
                    .map_err(|_| zm_broker_config::ConfigError::Invalid("invalid --bind address".to_string()))
            },
        )?;

    server::serve_http(bind, service).await?;
    Ok(())
}

fn add_user(config_path: Option<&std::path::Path>, username: &str, api_key: &str) -> Result<(), CliError> {
    let config = BrokerConfig::load(config_path)?;
    let store = config.build_store()?;
    let username = Username::parse(username)?;
    ApiKey::parse(api_key)?;
    let created = store.add_user(&username, api_key)?;
    if created == 1 {
        write_line(&format!("created user {}", username.as_str()));
    } else {
        write_line(&format!("user {} already exists (no change)", username.as_str()));
    }
    Ok(())
}

fn show_config(config_path: Option<&std::path::Path>) -> Result<(), CliError> {
    let config = BrokerConfig::load(config_path)?;
    write_line(&format!("engine: {:?}", config.db.engine));
    write_line(&format!("bind: {}", config.server.bind));
    write_line(&format!("age_reuse_previous_test: {}s", config.zonemaster.age_reuse_previous_test));
    write_line(&format!(
        "rpcapi: add_api_user={} add_batch_job={}",
        config.rpcapi.enable_add_api_user, config.rpcapi.enable_add_batch_job
    ));
    let profiles: Vec<String> = config.profile_names().collect();
    write_line(&format!("profiles: {}", profiles.join(", ")));
    Ok(())
}
