//! Server settings.
//!
//! Loaded with the `config` crate from, in order of precedence (lowest
//! first): built-in defaults, an optional TOML file, and `EMISSARY__`
//! environment variables using `__` as the section separator:
//!
//! ```text
//! EMISSARY__SERVER__PORT=9090
//! EMISSARY__PLUGINS__CACHE_BACKEND=large
//! EMISSARY__PLUGINS__TRANSFORMATIONS=uppercase-name,random-age
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use emissary_bus::BusConfig;
use emissary_cache::{LatencyHook, PluginManifest, WorkerConfig};
use serde::{Deserialize, Serialize};

/// Variable que apunta a un archivo de configuracion alternativo.
pub const CONFIG_PATH_ENV: &str = "EMISSARY_CONFIG";
/// Archivo de configuracion por defecto.
pub const DEFAULT_CONFIG_PATH: &str = "conf/emissary.toml";

const ENV_PREFIX: &str = "EMISSARY";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub bus: BusSettings,
    pub worker: WorkerSettings,
    pub plugins: PluginSettings,
}

/// HTTP listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Bound on the wait for a cache worker reply, per HTTP request.
    pub call_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            call_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    pub request_timeout_ms: u64,
    pub mailbox_capacity: usize,
    /// Random when unset.
    pub node_id: Option<String>,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            mailbox_capacity: 1024,
            node_id: None,
        }
    }
}

/// Artificial delay before each add; both bounds at 0 disable it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub latency_min_ms: u64,
    pub latency_max_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            latency_min_ms: 100,
            latency_max_ms: 350,
        }
    }
}

/// The plugin manifest.
///
/// Empty unless configured: a missing `cache_backend` makes startup fail.
/// `conf/emissary.toml` ships the small cache with `uppercase-name` and
/// `random-age`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSettings {
    pub cache_backend: Option<String>,
    pub transformations: Vec<String>,
}

impl PluginSettings {
    /// The small cache with both built-in example transformations.
    pub fn small_with_builtins() -> Self {
        Self {
            cache_backend: Some("small".to_string()),
            transformations: vec!["uppercase-name".to_string(), "random-age".to_string()],
        }
    }
}

impl Settings {
    /// Loads settings from the file named by `EMISSARY_CONFIG` (or
    /// `conf/emissary.toml`) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    /// Loads settings from `path` (optional, may not exist) and the environment.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .list_separator(",")
                    .with_list_parse_key("plugins.transformations")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Settings for tests: ephemeral port, no artificial latency, the small
    /// cache with both built-in transformations.
    pub fn for_tests() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 0,
                ..ServerSettings::default()
            },
            worker: WorkerSettings {
                latency_min_ms: 0,
                latency_max_ms: 0,
            },
            plugins: PluginSettings::small_with_builtins(),
            ..Self::default()
        }
    }

    /// The socket address to listen on.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.server.host.parse().map_err(|_| {
            ConfigError::Message(format!("invalid server.host '{}'", self.server.host))
        })?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.server.call_timeout_ms)
    }

    pub fn bus_config(&self) -> BusConfig {
        let mut config = BusConfig {
            request_timeout: Duration::from_millis(self.bus.request_timeout_ms),
            mailbox_capacity: self.bus.mailbox_capacity,
            ..BusConfig::default()
        };
        if let Some(node_id) = &self.bus.node_id {
            config.node_id = node_id.clone();
        }
        config
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            latency: LatencyHook::from_millis(self.worker.latency_min_ms, self.worker.latency_max_ms),
        }
    }

    pub fn manifest(&self) -> PluginManifest {
        PluginManifest {
            cache_backend: self.plugins.cache_backend.clone(),
            transformations: self.plugins.transformations.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_name_no_plugins() {
        let settings = Settings::default();

        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.call_timeout(), Duration::from_secs(5));
        assert_eq!(settings.plugins.cache_backend, None);
        assert!(settings.plugins.transformations.is_empty());
        assert_eq!(
            settings.worker_config().latency,
            LatencyHook::Uniform {
                min: Duration::from_millis(100),
                max: Duration::from_millis(350),
            }
        );
    }

    #[test]
    fn test_shipped_config_uses_small_cache_and_both_builtins() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH);

        let settings = Settings::load_from(&path).unwrap();

        assert_eq!(
            settings.manifest(),
            PluginManifest::new("small")
                .with_transformation("uppercase-name")
                .with_transformation("random-age")
        );
    }

    #[test]
    fn test_plugins_section_without_backend_stays_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emissary.toml");
        std::fs::write(&path, "[plugins]\ntransformations = [\"noop\"]\n").unwrap();

        let settings = Settings::load_from(&path).unwrap();

        assert_eq!(settings.manifest().cache_backend, None);
        assert_eq!(settings.manifest().transformations, vec!["noop".to_string()]);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let settings = Settings::load_from(Path::new("does/not/exist.toml")).unwrap();

        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.bus.mailbox_capacity, 1024);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emissary.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 9999

[worker]
latency_min_ms = 0
latency_max_ms = 0

[plugins]
cache_backend = "large"
transformations = ["noop"]
"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();

        assert_eq!(settings.server.port, 9999);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.worker_config(), WorkerConfig::immediate());
        assert_eq!(settings.manifest(), PluginManifest::new("large").with_transformation("noop"));
    }

    #[test]
    fn test_listen_addr() {
        let settings = Settings::for_tests();
        assert_eq!(settings.listen_addr().unwrap().to_string(), "127.0.0.1:0");

        let mut bad = Settings::default();
        bad.server.host = "not an ip".to_string();
        assert!(bad.listen_addr().is_err());
    }

    #[test]
    fn test_bus_config_keeps_explicit_node_id() {
        let mut settings = Settings::default();
        settings.bus.node_id = Some("node-a".to_string());
        settings.bus.request_timeout_ms = 1_500;

        let config = settings.bus_config();

        assert_eq!(config.node_id, "node-a");
        assert_eq!(config.request_timeout, Duration::from_millis(1_500));
    }
}
