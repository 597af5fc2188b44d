// common/src/config.rs
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use config::{Config as ConfigFile, File, Environment};

/// Central configuration for the session client and the dev backend
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub api_base_url: String,

    /// Network every session must live on
    pub network: NetworkConfig,
    pub health_check: HealthCheckConfig,
    pub wallet: WalletConfig,
    pub storage: StorageConfig,
    pub dev_backend: DevBackendConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub chain_name: String,
    /// Short name embedded in the sign-in message
    pub display_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    pub attempts: u32,
    pub attempt_timeout_secs: u64,
    /// Delay before attempt n+1 is `backoff_ms * n`
    pub backoff_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WalletConfig {
    pub request_timeout_secs: u64,
    pub signature_timeout_secs: u64,
    pub chain_policy: ChainPolicy,
}

/// What happens when the wallet reports a chain other than the required one
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainPolicy {
    /// Keep the session, flag it as wrong network
    #[default]
    Warn,
    /// Tear the session down
    Disconnect,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    pub session_file: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DevBackendConfig {
    pub addr: String,
    pub jwt_secret: String,
    pub nonce_ttl_secs: i64,
    pub token_ttl_secs: usize,
}

impl NetworkConfig {
    /// Avalanche C-Chain mainnet
    pub fn avalanche() -> Self {
        Self {
            chain_id: 43114,
            chain_name: "Avalanche C-Chain".to_string(),
            display_name: "Avalanche".to_string(),
            native_currency: NativeCurrency {
                name: "AVAX".to_string(),
                symbol: "AVAX".to_string(),
                decimals: 18,
            },
            rpc_urls: vec!["https://api.avax.network/ext/bc/C/rpc".to_string()],
            block_explorer_urls: vec!["https://snowtrace.io/".to_string()],
        }
    }

    /// Chain id as wallets expect it, e.g. `0xa86a`
    pub fn chain_id_hex(&self) -> String {
        format!("0x{:x}", self.chain_id)
    }
}

impl HealthCheckConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl WalletConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn signature_timeout(&self) -> Duration {
        Duration::from_secs(self.signature_timeout_secs)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            // Render cold starts take a while
            attempt_timeout_secs: 30,
            backoff_ms: 2000,
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            signature_timeout_secs: 120,
            chain_policy: ChainPolicy::Warn,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "https://avio-backend-v6no.onrender.com".to_string(),
            network: NetworkConfig::avalanche(),
            health_check: HealthCheckConfig::default(),
            wallet: WalletConfig::default(),
            storage: StorageConfig {
                session_file: "./.avio/session.json".to_string(),
            },
            dev_backend: DevBackendConfig {
                addr: "127.0.0.1:8081".to_string(),
                jwt_secret: "dev_secret".to_string(),
                nonce_ttl_secs: 300,
                token_ttl_secs: 86400,
            },
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config_dir = env::var("CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                // Check if we're in the project root or a subcrate
                let mut path = PathBuf::from("./config");
                if !path.exists() {
                    path = PathBuf::from("../config");
                }
                path
            });

        tracing::info!("Loading configuration from {}", config_dir.display());
        tracing::info!("Using run mode: {}", run_mode);

        let defaults = ConfigFile::try_from(&Config::default())?;

        let config = ConfigFile::builder()
            .add_source(defaults)
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", run_mode))).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // e.g. APP__WALLET__CHAIN_POLICY=disconnect
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Load from files, falling back to plain environment variables
    pub fn from_env() -> Self {
        match Self::load() {
            Ok(config) => {
                tracing::info!("Configuration loaded from files and environment");
                config
            },
            Err(e) => {
                tracing::warn!("Failed to load configuration from files: {}", e);
                tracing::info!("Falling back to environment variables only");

                let mut config = Self::default();

                if let Ok(url) = env::var("API_URL") {
                    config.api_base_url = url;
                }

                if let Some(attempts) = env::var("HEALTH_CHECK_ATTEMPTS")
                    .ok()
                    .and_then(|v| v.parse::<u32>().ok())
                {
                    config.health_check.attempts = attempts;
                }

                if let Some(timeout) = env::var("HEALTH_CHECK_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                {
                    config.health_check.attempt_timeout_secs = timeout;
                }

                config.wallet.chain_policy = match env::var("CHAIN_POLICY") {
                    Ok(v) if v.eq_ignore_ascii_case("disconnect") => ChainPolicy::Disconnect,
                    _ => ChainPolicy::Warn,
                };

                if let Ok(path) = env::var("SESSION_FILE") {
                    config.storage.session_file = path;
                }

                if let Ok(addr) = env::var("DEV_BACKEND_ADDR") {
                    config.dev_backend.addr = addr;
                }

                if let Ok(secret) = env::var("JWT_SECRET") {
                    config.dev_backend.jwt_secret = secret;
                }

                config
            }
        }
    }
}
