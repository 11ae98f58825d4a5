//! Configuration loading and validation for the Test Request Broker.
//!
//! Reads the broker's TOML configuration file, validates it, and exposes
//! constructors for the [`zm_broker_core::Validator`] and the configured
//! [`zm_broker_store::Store`] backend so the RPC and CLI layers build both
//! from one source of truth.

mod config;

pub use config::BrokerConfig;
pub use config::ConfigError;
pub use config::DbConfig;
pub use config::Engine;
pub use config::LanguageConfig;
pub use config::RpcApiConfig;
pub use config::ServerConfig;
pub use config::ZonemasterConfig;
pub use config::DEFAULT_AGE_REUSE_PREVIOUS_TEST;
