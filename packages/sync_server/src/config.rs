use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::info;

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   config.toml:     [server]
//                    port = 5000
//
//   env var:         SYNC_SERVER__PORT=5000   (double underscore = nesting)
//
//   (single underscore stays within field names: SYNC_RELAY__SEND_CHANNEL_CAPACITY)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub relay: RelayFileConfig,
}

/// HTTP listener knobs (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Browser origin allowed to call the API with credentials.
    /// When unset every origin is allowed.
    #[serde(default)]
    pub cors_origin: Option<String>,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: None,
        }
    }
}

/// Relay knobs (lives under `[relay]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayFileConfig {
    /// Outbound queue depth per connection. A recipient whose queue is full
    /// misses the event.
    #[serde(default = "default_send_channel_capacity")]
    pub send_channel_capacity: usize,
}

impl Default for RelayFileConfig {
    fn default() -> Self {
        Self {
            send_channel_capacity: default_send_channel_capacity(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_send_channel_capacity() -> usize {
    100
}

/// Build a figment that layers: defaults → config.toml → SYNC_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `SYNC_SERVER__PORT=8080`  →  `server.port = 8080`
///   `SYNC_RELAY__SEND_CHANNEL_CAPACITY=256`  →  `relay.send_channel_capacity = 256`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("SYNC_").split("__"))
}

// =============================================================================
// Runtime config (derived from FileConfig, used throughout the server)
// =============================================================================

/// Server configuration for runtime behavior.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: Option<String>,
    pub relay: RelayConfig,
}

#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Channel capacity for events to one connection
    pub send_channel_capacity: usize,
}

impl ServerConfig {
    pub fn from_file(fc: &FileConfig) -> Self {
        Self {
            host: fc.server.host.clone(),
            port: fc.server.port,
            cors_origin: fc.server.cors_origin.clone(),
            relay: RelayConfig {
                // a zero-capacity mpsc channel panics
                send_channel_capacity: fc.relay.send_channel_capacity.max(1),
            },
        }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }
}

// =============================================================================
// Directory layout config (not tunable via figment, derived from --data-dir)
// =============================================================================

#[derive(Clone, Debug)]
pub struct DataDir {
    pub root: PathBuf,
    pub db_path: PathBuf,
}

impl DataDir {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let root = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".syncsphere"),
        };

        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create data directory: {:?}", root))?;

        let db_path = root.join("syncsphere.db");

        info!("Data directory: {}", root.display());

        Ok(Self { root, db_path })
    }

    pub fn db_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.db_path.display())
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }
}
