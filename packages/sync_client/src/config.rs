use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;

/// Client knobs. Loaded from struct defaults, then `SYNC_CLIENT_*` env vars:
///
///   SYNC_CLIENT_SERVER_URL=http://chat.internal:5000
///   SYNC_CLIENT_TYPING_TIMEOUT_MS=3000
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Inactivity after the last keystroke before `stop typing` is emitted
    #[serde(default = "default_typing_timeout_ms")]
    pub typing_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            typing_timeout_ms: default_typing_timeout_ms(),
        }
    }
}

fn default_server_url() -> String {
    "http://localhost:5000".to_string()
}
fn default_typing_timeout_ms() -> u64 {
    2000
}

impl ClientConfig {
    pub fn load() -> Result<Self> {
        Ok(Self::figment().extract()?)
    }

    pub fn figment() -> figment::Figment {
        use figment::{
            Figment,
            providers::{Env, Serialized},
        };

        Figment::from(Serialized::defaults(ClientConfig::default()))
            .merge(Env::prefixed("SYNC_CLIENT_"))
    }

    pub fn with_server_url(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Default::default()
        }
    }

    /// Base URL without a trailing slash.
    pub fn api_base(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }

    /// Relay endpoint derived from the server URL.
    pub fn ws_url(&self) -> String {
        let base = self.api_base();
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{base}/api/ws")
    }

    pub fn typing_timeout(&self) -> Duration {
        Duration::from_millis(self.typing_timeout_ms)
    }
}
