use std::path::PathBuf;
use std::time::Duration;
use url::Url;
use veriface_client::{candidate_endpoints, ClientConfig};

/// CLI configuration, loaded from environment variables.
pub struct Config {
    /// Explicitly configured backend endpoint, tried before loopback.
    pub endpoint: Option<Url>,
    /// Path to the SQLite ledger database.
    pub db_path: PathBuf,
    /// Timeout in seconds for a health request.
    pub health_timeout_secs: u64,
    /// Timeout in seconds for a recognize request.
    pub recognize_timeout_secs: u64,
    /// Consecutive failed health sweeps before rechecks pause.
    pub max_reconnect_attempts: u32,
    /// Seconds automatic rechecks stay paused after exhausting attempts.
    pub retry_cooldown_secs: u64,
    /// Seconds between background health checks.
    pub poll_interval_secs: u64,
    /// Officer id recorded with audit entries.
    pub officer_id: String,
}

impl Config {
    /// Load configuration from `VERIFACE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let endpoint = match std::env::var("VERIFACE_ENDPOINT") {
            Ok(raw) => match Url::parse(&raw) {
                Ok(url) => Some(url),
                Err(err) => {
                    tracing::warn!(value = %raw, error = %err, "ignoring malformed VERIFACE_ENDPOINT");
                    None
                }
            },
            Err(_) => None,
        };

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("veriface");

        let db_path = std::env::var("VERIFACE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("ledger.db"));

        Self {
            endpoint,
            db_path,
            health_timeout_secs: env_u64("VERIFACE_HEALTH_TIMEOUT_SECS", 8),
            recognize_timeout_secs: env_u64("VERIFACE_RECOGNIZE_TIMEOUT_SECS", 30),
            max_reconnect_attempts: env_u32("VERIFACE_MAX_RECONNECT_ATTEMPTS", 3),
            retry_cooldown_secs: env_u64("VERIFACE_RETRY_COOLDOWN_SECS", 30),
            poll_interval_secs: env_u64("VERIFACE_POLL_INTERVAL_SECS", 30),
            officer_id: std::env::var("VERIFACE_OFFICER_ID")
                .unwrap_or_else(|_| "demo_officer".to_string()),
        }
    }

    /// Connectivity settings for the recognition client.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            endpoints: candidate_endpoints(self.endpoint.as_ref()),
            health_timeout: Duration::from_secs(self.health_timeout_secs),
            recognize_timeout: Duration::from_secs(self.recognize_timeout_secs),
            max_reconnect_attempts: self.max_reconnect_attempts,
            retry_cooldown: Duration::from_secs(self.retry_cooldown_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
        }
    }

    /// User agent recorded in audit entries' device info.
    pub fn user_agent(&self) -> String {
        format!("veriface-cli/{}", env!("CARGO_PKG_VERSION"))
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
