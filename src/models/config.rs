//! Configuration model loaded from external sources.
//!
//! Values come from `config/default.yaml`, an optional `config/{APP_ENV}.yaml`
//! and `APP__`-prefixed environment variables, in increasing priority
//! (`APP__CONSULTA__PAGE_SIZE=50` overrides `consulta.page_size`).

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::pagination::CountMode;

#[derive(Clone, Debug, Deserialize)]
/// Basic configuration shared across handlers.
pub struct ServerConfig {
    /// Cookie domain; host-only cookies when absent.
    #[serde(default)]
    pub domain: Option<String>,
    pub address: String,
    pub port: u16,
    /// Signing key for the session, identity and flash cookies (64+ bytes).
    pub secret: String,
    #[serde(default)]
    pub secure_cookies: bool,
    pub templates_dir: String,
    #[serde(default = "default_assets_dir")]
    pub assets_dir: String,
    pub backend: BackendKind,
    /// SQLite path used by the `sqlite` backend.
    #[serde(default)]
    pub database_url: String,
    #[serde(default)]
    pub supabase: SupabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub consulta: ConsultaConfig,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Table backend answering list, count and insert calls.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Postgrest,
    Sqlite,
    Memory,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub anon_key: String,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthProviderKind {
    Supabase,
    /// Development provider that signs everyone in as `auth.local_email`.
    Local,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AuthConfig {
    pub provider: AuthProviderKind,
    /// Callback URL registered with the provider.
    pub redirect_url: String,
    #[serde(default = "default_local_email")]
    pub local_email: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ConsultaConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub count_mode: CountMode,
}

impl Default for ConsultaConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            count_mode: CountMode::default(),
        }
    }
}

fn default_assets_dir() -> String {
    "./assets".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_local_email() -> String {
    "dev@localhost".to_string()
}

fn default_page_size() -> usize {
    20
}

impl ServerConfig {
    /// Loads the layered configuration for the environment named by `APP_ENV`.
    pub fn load() -> Result<Self, ConfigError> {
        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "local".to_string());

        Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{app_env}")).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()
    }
}
