use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::time::Duration;
use crate::info;
use crate::pagination::DEFAULT_ALL_LOADED_THRESHOLD;

fn duration_from_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let secs = u64::deserialize(deserializer)?;
    Ok(Duration::from_secs(secs))
}

fn duration_from_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let millis = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}

fn non_zero<'de, D>(deserializer: D) -> Result<NonZeroUsize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let n = usize::deserialize(deserializer)?;
    NonZeroUsize::new(n).ok_or_else(|| serde::de::Error::custom("capacity must be greater than zero"))
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub http: HttpSettings,
    pub storage: StorageSettings,
    #[serde(default)]
    pub grid: GridSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpSettings {
    pub enable: bool,
    pub bind_address: SocketAddr,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    pub db_path: String,
    #[serde(default)]
    pub seed_demo: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GridSettings {
    #[serde(default = "GridSettings::default_threshold")]
    pub all_loaded_threshold: u64,
    #[serde(rename = "query_timeout_ms", default = "GridSettings::default_timeout", deserialize_with = "duration_from_millis")]
    pub query_timeout: Duration,
    #[serde(rename = "registry_ttl_s", default = "GridSettings::default_ttl", deserialize_with = "duration_from_secs")]
    pub registry_ttl: Duration,
    #[serde(default = "GridSettings::default_capacity", deserialize_with = "non_zero")]
    pub registry_cache_capacity: NonZeroUsize,
    #[serde(default = "GridSettings::default_sessions", deserialize_with = "non_zero")]
    pub session_capacity: NonZeroUsize,
    #[serde(default = "GridSettings::default_admin_role")]
    pub admin_role: String,
}

impl GridSettings {
    fn default_threshold() -> u64 { DEFAULT_ALL_LOADED_THRESHOLD }
    fn default_timeout() -> Duration { Duration::from_secs(5) }
    fn default_ttl() -> Duration { Duration::from_secs(30) }
    fn default_capacity() -> NonZeroUsize { NonZeroUsize::new(1024).unwrap_or(NonZeroUsize::MIN) }
    fn default_sessions() -> NonZeroUsize { NonZeroUsize::new(10_000).unwrap_or(NonZeroUsize::MIN) }
    fn default_admin_role() -> String { "Admin".to_string() }
}

impl Default for GridSettings {
    fn default() -> Self {
        GridSettings {
            all_loaded_threshold: Self::default_threshold(),
            query_timeout: Self::default_timeout(),
            registry_ttl: Self::default_ttl(),
            registry_cache_capacity: Self::default_capacity(),
            session_capacity: Self::default_sessions(),
            admin_role: Self::default_admin_role(),
        }
    }
}

impl AppConfig {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let builder =
            Config::builder()
                .add_source(File::with_name(path).required(true))
                .add_source(Environment::with_prefix("GRIDGATE").try_parsing(true).separator("__"));
        let config: AppConfig = builder.build()?.try_deserialize()?;
        info!("Loaded config from {} : {:?}", path, config);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn grid_section_falls_back_to_defaults() {
        let raw = r#"
            [http]
            enable = false
            bind_address = "127.0.0.1:9000"

            [storage]
            db_path = "/tmp/grid.redb"
        "#;
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.grid.all_loaded_threshold, 1000);
        assert_eq!(config.grid.query_timeout, Duration::from_secs(5));
        assert_eq!(config.grid.admin_role, "Admin");
        assert!(!config.storage.seed_demo);
    }

    #[test]
    fn grid_section_reads_units() {
        let raw = r#"
            [http]
            enable = true
            bind_address = "0.0.0.0:8000"

            [storage]
            db_path = "grid.redb"
            seed_demo = true

            [grid]
            all_loaded_threshold = 250
            query_timeout_ms = 1500
            registry_ttl_s = 0
            registry_cache_capacity = 8
        "#;
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.grid.all_loaded_threshold, 250);
        assert_eq!(config.grid.query_timeout, Duration::from_millis(1500));
        assert_eq!(config.grid.registry_ttl, Duration::ZERO);
        assert_eq!(config.grid.registry_cache_capacity.get(), 8);
        assert_eq!(config.grid.session_capacity.get(), 10_000);
    }
}
