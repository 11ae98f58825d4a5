// zm-broker-config/src/config.rs
// ============================================================================
// Module: Broker Configuration
// Description: TOML configuration loading and validation (§6 Configuration).
// Purpose: Fail closed on missing/invalid config; build the Validator and
//          the configured Store backend from one source of truth.
// Dependencies: zm-broker-core, zm-broker-store, serde, toml, thiserror
// ============================================================================

//! ## Overview
//! The distilled spec calls this an "INI-style file"; the broker (like its
//! teacher) configures itself from TOML with the same six logical sections:
//! `DB`, `ZONEMASTER`, `RPCAPI`, `LANGUAGE`, `PUBLIC_PROFILES`,
//! `PRIVATE_PROFILES`, plus a `SERVER` section for the bind address this
//! core's ambient HTTP transport needs.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use zm_broker_core::LocaleTag;
use zm_broker_core::Validator;
use zm_broker_store::MysqlStore;
use zm_broker_store::MysqlStoreConfig;
use zm_broker_store::PostgresStore;
use zm_broker_store::PostgresStoreConfig;
use zm_broker_store::SqliteStore;
use zm_broker_store::SqliteStoreConfig;
use zm_broker_store::Store;

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "zm-broker.toml";
/// Environment variable used to override the config path.
const CONFIG_ENV_VAR: &str = "ZM_BROKER_CONFIG";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// `ZONEMASTER.age_reuse_previous_test` default, in seconds (§6).
pub const DEFAULT_AGE_REUSE_PREVIOUS_TEST: i64 = 600;
/// Default bind address for the JSON-RPC HTTP listener.
const DEFAULT_BIND: &str = "127.0.0.1:5000";

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Which Store backend (C3) this broker instance is configured for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Embedded single-file backend.
    #[default]
    Sqlite,
    /// Client-server relational backend A.
    Postgres,
    /// Client-server relational backend B.
    Mysql,
}

/// The `[DB]` section: which backend to instantiate and its settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DbConfig {
    /// Selected backend (`DB.engine`).
    #[serde(default)]
    pub engine: Engine,
    /// Settings for the `SQLite` backend, required when `engine = "sqlite"`.
    #[serde(default)]
    pub sqlite: Option<SqliteStoreConfig>,
    /// Settings for the Postgres backend, required when `engine = "postgres"`.
    #[serde(default)]
    pub postgres: Option<PostgresStoreConfig>,
    /// Settings for the `MySQL` backend, required when `engine = "mysql"`.
    #[serde(default)]
    pub mysql: Option<MysqlStoreConfig>,
}

/// The `[ZONEMASTER]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ZonemasterConfig {
    /// Fingerprint reuse window in seconds (`age_reuse_previous_test`, §3
    /// invariant 2).
    #[serde(default = "default_age_reuse_previous_test")]
    pub age_reuse_previous_test: i64,
    /// Queue tag this broker instance considers authoritative
    /// (`lock_on_queue`); consulted by the dispatch-facing RPC methods.
    #[serde(default)]
    pub lock_on_queue: i32,
}

impl Default for ZonemasterConfig {
    fn default() -> Self {
        Self { age_reuse_previous_test: DEFAULT_AGE_REUSE_PREVIOUS_TEST, lock_on_queue: 0 }
    }
}

const fn default_age_reuse_previous_test() -> i64 {
    DEFAULT_AGE_REUSE_PREVIOUS_TEST
}

/// The `[RPCAPI]` section: per-method feature gates (§6, §7).
#[derive(Debug, Clone, Deserialize)]
pub struct RpcApiConfig {
    /// If false, `add_api_user` responds with `-32601` regardless of caller.
    #[serde(default = "default_true")]
    pub enable_add_api_user: bool,
    /// If false, `add_batch_job` responds with `-32601`.
    #[serde(default = "default_true")]
    pub enable_add_batch_job: bool,
}

impl Default for RpcApiConfig {
    fn default() -> Self {
        Self { enable_add_api_user: true, enable_add_batch_job: true }
    }
}

const fn default_true() -> bool {
    true
}

/// The `[LANGUAGE]` section: the supported locale set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LanguageConfig {
    /// Space-separated list of `ll_CC.UTF-8` locale tags.
    #[serde(default)]
    pub locale: String,
}

impl LanguageConfig {
    /// Parses `locale` into the `(short, full)` tag pairs the validator and
    /// `get_language_tags` consume.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if any token isn't a well-formed
    /// `ll_CC[.UTF-8]` locale tag.
    pub fn locale_tags(&self) -> Result<Vec<LocaleTag>, ConfigError> {
        self.locale.split_whitespace().map(parse_locale_tag).collect()
    }
}

fn parse_locale_tag(token: &str) -> Result<LocaleTag, ConfigError> {
    let full_form = token.split('.').next().unwrap_or(token);
    let bytes = full_form.as_bytes();
    let valid = bytes.len() == 5
        && bytes[0].is_ascii_alphabetic()
        && bytes[1].is_ascii_alphabetic()
        && bytes[2] == b'_'
        && bytes[3].is_ascii_alphabetic()
        && bytes[4].is_ascii_alphabetic();
    if !valid {
        return Err(ConfigError::Invalid(format!("invalid locale tag: {token}")));
    }
    Ok(LocaleTag {
        short: full_form[..2].to_ascii_lowercase(),
        full: format!("{}_{}", &full_form[..2].to_ascii_lowercase(), &full_form[3..].to_ascii_uppercase()),
    })
}

/// The ambient `[SERVER]` section carrying the JSON-RPC HTTP bind address
/// (the distilled spec marks HTTP transport out of scope for its core, but
/// the ambient stack still needs somewhere to listen).
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the JSON-RPC HTTP listener binds to.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: DEFAULT_BIND.to_string() }
    }
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

impl ServerConfig {
    /// Parses `bind` into a [`SocketAddr`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `bind` is not a valid socket
    /// address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind.parse().map_err(|_| ConfigError::Invalid("invalid server.bind address".to_string()))
    }
}

/// The full broker configuration (§6).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrokerConfig {
    /// `[DB]` — selected Store backend.
    #[serde(default, rename = "DB")]
    pub db: DbConfig,
    /// `[ZONEMASTER]` — reuse window and queue authority.
    #[serde(default, rename = "ZONEMASTER")]
    pub zonemaster: ZonemasterConfig,
    /// `[RPCAPI]` — per-method feature gates.
    #[serde(default, rename = "RPCAPI")]
    pub rpcapi: RpcApiConfig,
    /// `[LANGUAGE]` — supported locale set.
    #[serde(default, rename = "LANGUAGE")]
    pub language: LanguageConfig,
    /// `[PUBLIC_PROFILES]` — profile name to profile file path.
    #[serde(default, rename = "PUBLIC_PROFILES")]
    pub public_profiles: BTreeMap<String, PathBuf>,
    /// `[PRIVATE_PROFILES]` — profile name to profile file path.
    #[serde(default, rename = "PRIVATE_PROFILES")]
    pub private_profiles: BTreeMap<String, PathBuf>,
    /// `[SERVER]` — ambient HTTP listener settings.
    #[serde(default, rename = "SERVER")]
    pub server: ServerConfig,
}

impl BrokerConfig {
    /// Loads configuration from disk using the default resolution rules
    /// (explicit path, then `ZM_BROKER_CONFIG`, then `./zm-broker.toml`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file is missing, oversized,
    /// malformed, or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config: Self = toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a required section is missing
    /// or a value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.db.engine {
            Engine::Sqlite if self.db.sqlite.is_none() => {
                return Err(ConfigError::Invalid(
                    "db.sqlite section required when db.engine = \"sqlite\"".to_string(),
                ));
            }
            Engine::Postgres if self.db.postgres.is_none() => {
                return Err(ConfigError::Invalid(
                    "db.postgres section required when db.engine = \"postgres\"".to_string(),
                ));
            }
            Engine::Mysql if self.db.mysql.is_none() => {
                return Err(ConfigError::Invalid(
                    "db.mysql section required when db.engine = \"mysql\"".to_string(),
                ));
            }
            Engine::Sqlite | Engine::Postgres | Engine::Mysql => {}
        }
        if self.zonemaster.age_reuse_previous_test < 0 {
            return Err(ConfigError::Invalid(
                "zonemaster.age_reuse_previous_test must be non-negative".to_string(),
            ));
        }
        self.language.locale_tags()?;
        self.server.socket_addr()?;
        Ok(())
    }

    /// The union of configured public and private profile names, lowercased
    /// (the validator's profile set, §4.1).
    pub fn profile_names(&self) -> impl Iterator<Item = String> + '_ {
        self.public_profiles
            .keys()
            .chain(self.private_profiles.keys())
            .map(|name| name.to_ascii_lowercase())
    }

    /// Builds a [`Validator`] from the configured profile and locale sets.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `language.locale` is malformed.
    pub fn build_validator(&self) -> Result<Validator, ConfigError> {
        Ok(Validator::new(self.profile_names(), self.language.locale_tags()?))
    }

    /// Builds the configured [`Store`] backend.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the required backend section is
    /// missing or the backend fails to connect/migrate.
    pub fn build_store(&self) -> Result<Arc<dyn Store>, ConfigError> {
        match self.db.engine {
            Engine::Sqlite => {
                let cfg = self
                    .db
                    .sqlite
                    .as_ref()
                    .ok_or_else(|| ConfigError::Invalid("db.sqlite section missing".to_string()))?;
                let store = SqliteStore::new(cfg.clone()).map_err(|err| ConfigError::Invalid(err.to_string()))?;
                Ok(Arc::new(store))
            }
            Engine::Postgres => {
                let cfg = self
                    .db
                    .postgres
                    .as_ref()
                    .ok_or_else(|| ConfigError::Invalid("db.postgres section missing".to_string()))?;
                let store = PostgresStore::new(cfg).map_err(|err| ConfigError::Invalid(err.to_string()))?;
                Ok(Arc::new(store))
            }
            Engine::Mysql => {
                let cfg = self
                    .db
                    .mysql
                    .as_ref()
                    .ok_or_else(|| ConfigError::Invalid("db.mysql section missing".to_string()))?;
                let store = MysqlStore::new(cfg).map_err(|err| ConfigError::Invalid(err.to_string()))?;
                Ok(Arc::new(store))
            }
        }
    }
}

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn minimal_sqlite_config_loads_with_defaults() {
        let file = write_config(
            r#"
            [DB]
            engine = "sqlite"

            [DB.sqlite]
            path = "/tmp/zm-broker-test.sqlite3"

            [LANGUAGE]
            locale = "en_US.UTF-8 fr_FR.UTF-8"
            "#,
        );
        let config = BrokerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.zonemaster.age_reuse_previous_test, DEFAULT_AGE_REUSE_PREVIOUS_TEST);
        assert!(config.rpcapi.enable_add_api_user);
        assert!(config.rpcapi.enable_add_batch_job);
        assert_eq!(config.server.bind, DEFAULT_BIND);
    }

    #[test]
    fn missing_backend_section_is_rejected() {
        let file = write_config(
            r#"
            [DB]
            engine = "postgres"
            "#,
        );
        let err = BrokerConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn locale_tags_parse_short_and_full_forms() {
        let language = LanguageConfig { locale: "en_US.UTF-8 fr_FR".to_string() };
        let tags = language.locale_tags().unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].short, "en");
        assert_eq!(tags[0].full, "en_US");
        assert_eq!(tags[1].full, "fr_FR");
    }

    #[test]
    fn malformed_locale_tag_is_rejected() {
        let language = LanguageConfig { locale: "not-a-locale".to_string() };
        assert!(language.locale_tags().is_err());
    }

    #[test]
    fn profile_names_union_public_and_private_lowercased() {
        let mut config = BrokerConfig::default();
        config.public_profiles.insert("Default".to_string(), PathBuf::from("/etc/default.profile"));
        config.private_profiles.insert("internal".to_string(), PathBuf::from("/etc/internal.profile"));
        let names: Vec<String> = config.profile_names().collect();
        assert!(names.contains(&"default".to_string()));
        assert!(names.contains(&"internal".to_string()));
    }

    #[test]
    fn invalid_bind_address_is_rejected() {
        let mut config = BrokerConfig::default();
        config.db.sqlite = Some(SqliteStoreConfig { path: PathBuf::from(":memory:"), busy_timeout_ms: 5_000 });
        config.server.bind = "not-an-address".to_string();
        assert!(config.validate().is_err());
    }
}
