//! Settings of the ledger service, read from an optional `settings.toml`
//! and overridden by `LEDGER__*` environment variables
//! (e.g. `LEDGER__SERVER__PORT=8080`).
//!
//! ```toml
//! [app]
//! level = "info"
//!
//! [server]
//! bind = "0.0.0.0"
//! port = 3000
//! database = { sqlite = "ledger.db" }
//!
//! [jobs]
//! auto_debit_interval_secs = 86400
//!
//! [engine]
//! cache_ttl_secs = 10
//! lock_timeout_ms = 8000
//! ```
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

const DEFAULT_AUTO_DEBIT_INTERVAL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Deserialize)]
pub struct App {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    Sqlite(String),
}

#[derive(Debug, Deserialize)]
pub struct Server {
    pub bind: Option<String>,
    pub port: u16,
    pub database: Database,
}

#[derive(Debug, Deserialize)]
pub struct Jobs {
    /// `0` disables the job.
    #[serde(default = "default_auto_debit_interval")]
    pub auto_debit_interval_secs: u64,
}

impl Default for Jobs {
    fn default() -> Self {
        Self {
            auto_debit_interval_secs: default_auto_debit_interval(),
        }
    }
}

fn default_auto_debit_interval() -> u64 {
    DEFAULT_AUTO_DEBIT_INTERVAL_SECS
}

#[derive(Debug, Default, Deserialize)]
pub struct EngineSettings {
    pub cache_ttl_secs: Option<u64>,
    pub lock_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app: App,
    pub server: Option<Server>,
    #[serde(default)]
    pub jobs: Jobs,
    #[serde(default)]
    pub engine: EngineSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("settings").required(false))
            .add_source(
                Environment::with_prefix("LEDGER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}
