use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::error;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DB_NAME: &str = "collabhub";
const DEFAULT_MAX_FILE_BYTES: u64 = 50 * 1024 * 1024;
const DEFAULT_ROOM_IDLE_TTL_SEC: u64 = 7200;
const DEFAULT_PERSIST_DEBOUNCE_MS: u64 = 2000;
const DEFAULT_PERSIST_MAX_WAIT_MS: u64 = 10_000;
const DEFAULT_ALLOWED_EXT: &str = ".js,.java,.py,.zip";
const DEFAULT_RT_SUBPROTOCOL: &str = "codecollab.rt.v1";
const DEFAULT_SWEEP_PERIOD_SEC: u64 = 1800;
const DEFAULT_COMPRESSION_THRESHOLD_BYTES: u64 = 64 * 1024;

/// `{data_dir}/config.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    port: Option<u16>,
    store_uri: Option<String>,
    db_name: Option<String>,
    jwt_jwks_url: Option<String>,
    max_file_bytes: Option<u64>,
    room_idle_ttl_sec: Option<u64>,
    persist_debounce_ms: Option<u64>,
    persist_max_wait_ms: Option<u64>,
    allowed_ext: Option<String>,
    rt_subprotocol: Option<String>,
    log: Option<String>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub log: String,
    /// Connection string to the durable store (`STORE_URI`). For the bundled
    /// SQLite backend this is a filesystem path.
    pub store_uri: String,
    pub db_name: String,
    pub jwt_jwks_url: Option<String>,
    pub max_file_bytes: u64,
    pub room_idle_ttl: Duration,
    pub persist_debounce: Duration,
    pub persist_max_wait: Duration,
    pub allowed_ext: Vec<String>,
    pub rt_subprotocol: String,
    pub sweep_period: Duration,
    pub compression_threshold_bytes: u64,
}

impl HubConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env — passed as `Some(value)` from clap, or read directly
    ///      for keys with no dedicated flag (§6.4)
    ///   2. TOML file at `{data_dir}/config.toml`
    ///   3. Built-in defaults
    pub fn new(
        port: Option<u16>,
        data_dir: Option<PathBuf>,
        log: Option<String>,
        jwt_jwks_url: Option<String>,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);

        let toml = load_toml(&data_dir).unwrap_or_default();

        let port = port.or(toml.port).unwrap_or(DEFAULT_PORT);
        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());

        let store_uri = std::env::var("STORE_URI")
            .ok()
            .or(toml.store_uri)
            .unwrap_or_else(|| data_dir.join("collabhub.db").display().to_string());

        let db_name = std::env::var("DB_NAME")
            .ok()
            .or(toml.db_name)
            .unwrap_or_else(|| DEFAULT_DB_NAME.to_string());

        let jwt_jwks_url = jwt_jwks_url
            .or_else(|| std::env::var("JWT_JWKS_URL").ok())
            .or(toml.jwt_jwks_url);

        let max_file_bytes = std::env::var("MAX_FILE_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(toml.max_file_bytes)
            .unwrap_or(DEFAULT_MAX_FILE_BYTES);

        let room_idle_ttl_sec = std::env::var("ROOM_IDLE_TTL_SEC")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(toml.room_idle_ttl_sec)
            .unwrap_or(DEFAULT_ROOM_IDLE_TTL_SEC);

        let persist_debounce_ms = std::env::var("PERSIST_DEBOUNCE_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(toml.persist_debounce_ms)
            .unwrap_or(DEFAULT_PERSIST_DEBOUNCE_MS);

        let persist_max_wait_ms = std::env::var("PERSIST_MAX_WAIT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(toml.persist_max_wait_ms)
            .unwrap_or(DEFAULT_PERSIST_MAX_WAIT_MS);

        let allowed_ext = std::env::var("ALLOWED_EXT")
            .ok()
            .or(toml.allowed_ext)
            .unwrap_or_else(|| DEFAULT_ALLOWED_EXT.to_string())
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        let rt_subprotocol = std::env::var("RT_SUBPROTOCOL")
            .ok()
            .or(toml.rt_subprotocol)
            .unwrap_or_else(|| DEFAULT_RT_SUBPROTOCOL.to_string());

        Self {
            port,
            data_dir,
            log,
            store_uri,
            db_name,
            jwt_jwks_url,
            max_file_bytes,
            room_idle_ttl: Duration::from_secs(room_idle_ttl_sec),
            persist_debounce: Duration::from_millis(persist_debounce_ms),
            persist_max_wait: Duration::from_millis(persist_max_wait_ms),
            allowed_ext,
            rt_subprotocol,
            sweep_period: Duration::from_secs(DEFAULT_SWEEP_PERIOD_SEC),
            compression_threshold_bytes: DEFAULT_COMPRESSION_THRESHOLD_BYTES,
        }
    }

    pub fn is_archive_ext(&self, ext: &str) -> bool {
        ext.eq_ignore_ascii_case(".zip")
    }

    pub fn is_allowed_ext(&self, ext: &str) -> bool {
        let ext = ext.to_lowercase();
        self.allowed_ext.iter().any(|e| *e == ext)
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("collabhub");
        }
    }
    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("collabhub");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("collabhub");
        }
    }
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("collabhub");
        }
    }
    PathBuf::from(".collabhub")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_toml_or_env() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = HubConfig::new(None, Some(dir.path().to_path_buf()), None, None);
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.db_name, DEFAULT_DB_NAME);
        assert!(cfg.is_allowed_ext(".js"));
        assert!(cfg.is_allowed_ext(".PY"));
        assert!(!cfg.is_allowed_ext(".exe"));
        assert!(cfg.is_archive_ext(".zip"));
    }

    #[test]
    fn explicit_port_wins_over_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = HubConfig::new(Some(9999), Some(dir.path().to_path_buf()), None, None);
        assert_eq!(cfg.port, 9999);
    }
}
