//! Relay configuration – `$NEXUS_CONFIG` or `~/.nexus/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use nexus_relay::{DEFAULT_PORT, DEFAULT_RATE_LIMIT, DEFAULT_WS_PATH, RelaySettings};
use nexus_types::RelayError;
use zeroize::Zeroizing;

/// Persisted relay configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// TCP port for the WebSocket relay.
    #[serde(default = "default_port")]
    pub port: u16,

    /// WebSocket endpoint path.
    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// When set, peers must connect with `?token=<secret>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_secret: Option<Zeroizing<String>>,

    /// Inbound text frames per second per connection (`0` = unlimited).
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,

    /// Outbound frames queued per connection before new ones are dropped.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("ws_path", &self.ws_path)
            .field(
                "shared_secret",
                if self.shared_secret.is_some() { &"<redacted>" } else { &"<not set>" },
            )
            .field("rate_limit", &self.rate_limit)
            .field("outbound_queue", &self.outbound_queue)
            .finish()
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_ws_path() -> String {
    DEFAULT_WS_PATH.to_string()
}
fn default_rate_limit() -> u32 {
    DEFAULT_RATE_LIMIT
}
fn default_outbound_queue() -> usize {
    nexus_middleware::DEFAULT_OUTBOUND_CAPACITY
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            ws_path: default_ws_path(),
            shared_secret: None,
            rate_limit: default_rate_limit(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

impl Config {
    /// Transport settings for [`nexus_relay::RelayServer`].
    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings::new()
            .with_port(self.port)
            .with_ws_path(self.ws_path.clone())
            .with_shared_secret(self.shared_secret.clone())
            .with_rate_limit(self.rate_limit)
            .with_outbound_capacity(self.outbound_queue)
    }
}

/// `$NEXUS_CONFIG` when set, `~/.nexus/config.toml` otherwise.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("NEXUS_CONFIG") {
        return PathBuf::from(path);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".nexus").join("config.toml")
}

/// Load the config file (defaults when absent), then apply environment
/// overrides.
pub fn load() -> Result<Config, RelayError> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Parse a config file.  `None` when it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, RelayError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| RelayError::Config(format!("failed to read {}: {e}", path.display())))?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| RelayError::Config(format!("failed to parse {}: {e}", path.display())))
}

/// Apply environment overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `PORT`, `NEXUS_PORT` (wins) | `port` |
/// | `NEXUS_WS_PATH` | `ws_path` |
/// | `NEXUS_SHARED_SECRET` | `shared_secret` |
/// | `NEXUS_RATE_LIMIT` | `rate_limit` |
/// | `NEXUS_OUTBOUND_QUEUE` | `outbound_queue` |
///
/// Unparseable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    for var in ["PORT", "NEXUS_PORT"] {
        if let Ok(v) = std::env::var(var)
            && let Ok(port) = v.parse::<u16>()
        {
            cfg.port = port;
        }
    }
    if let Ok(v) = std::env::var("NEXUS_WS_PATH") {
        cfg.ws_path = v;
    }
    if let Ok(v) = std::env::var("NEXUS_SHARED_SECRET") {
        cfg.shared_secret = Some(Zeroizing::new(v));
    }
    if let Ok(v) = std::env::var("NEXUS_RATE_LIMIT")
        && let Ok(limit) = v.parse::<u32>()
    {
        cfg.rate_limit = limit;
    }
    if let Ok(v) = std::env::var("NEXUS_OUTBOUND_QUEUE")
        && let Ok(depth) = v.parse::<usize>()
    {
        cfg.outbound_queue = depth;
    }
}

/// Write `cfg` to `path`, creating the parent directory.  Owner-only
/// permissions on Unix, since the file may hold the shared secret.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), RelayError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| {
                RelayError::Config(format!("failed to create {}: {e}", parent.display()))
            })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| {
                    RelayError::Config(format!("failed to restrict {}: {e}", parent.display()))
                })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| RelayError::Config(format!("failed to serialise config: {e}")))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| RelayError::Config(format!("failed to write {}: {e}", path.display())))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| RelayError::Config(format!("failed to write {}: {e}", path.display())))?;
    Ok(())
}
