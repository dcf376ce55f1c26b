//! Runtime configuration loader and common helpers.

use std::{env, fs, path::Path, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::mint::gas::{GasPolicy, DEFAULT_GAS_MULTIPLIER, DEFAULT_GAS_PRICE_MULTIPLIER};

const DEFAULT_SETTINGS_PATH: &str = "config/settings.json";
const DEFAULT_STORAGE_PATH: &str = "./paper-cats-storage.json";
const DEFAULT_NETWORK_ID: u64 = 4;
const DEFAULT_CACHE_TTL_SECS: u64 = 60 * 60 * 24;
const DEFAULT_ABI_CACHE_TTL_SECS: u64 = 60 * 60 * 24 * 30;
const DEFAULT_METADATA_RETRY_DELAY_MS: u64 = 5_000;
const DEFAULT_METADATA_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// ------------------------------------------------------------------
/// Main Settings object
/// ------------------------------------------------------------------
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /* -------- contract ------------------------------ */
    pub contract_address: String,
    pub network_id: u64,

    /* -------- block explorer ------------------------ */
    /// Replaces `https://<api>.etherscan.io` when set.
    pub explorer_api_url: Option<String>,
    pub explorer_api_key: Option<String>,

    /* -------- cache --------------------------------- */
    pub storage_path: PathBuf,
    pub cache_ttl_secs: u64,
    pub abi_cache_ttl_secs: u64,

    /* -------- minting ------------------------------- */
    pub gas_multiplier: f64,
    pub gas_price_multiplier: f64,

    /* -------- metadata ------------------------------ */
    pub metadata_retry_delay_ms: u64,
    pub metadata_max_attempts: u32,

    pub http_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            contract_address: String::new(),
            network_id: DEFAULT_NETWORK_ID,
            explorer_api_url: None,
            explorer_api_key: None,
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            abi_cache_ttl_secs: DEFAULT_ABI_CACHE_TTL_SECS,
            gas_multiplier: DEFAULT_GAS_MULTIPLIER,
            gas_price_multiplier: DEFAULT_GAS_PRICE_MULTIPLIER,
            metadata_retry_delay_ms: DEFAULT_METADATA_RETRY_DELAY_MS,
            metadata_max_attempts: DEFAULT_METADATA_MAX_ATTEMPTS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    /// --------------------------------------------------------------
    /// Read `settings.json` from disk. Missing keys fall back to defaults.
    /// --------------------------------------------------------------
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading settings file {:?}", path.as_ref()))?;
        let json: serde_json::Value = serde_json::from_str(&raw)
            .with_context(|| format!("parsing settings file {:?}", path.as_ref()))?;
        let defaults = Self::default();

        /* -------- plain strings ---------------------------------- */
        let contract_address = json["contract_address"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let explorer_api_url = json["explorer_api_url"].as_str().map(|s| s.to_string());
        let explorer_api_key = json["explorer_api_key"].as_str().map(|s| s.to_string());
        let storage_path = json["storage_path"]
            .as_str()
            .map(PathBuf::from)
            .unwrap_or(defaults.storage_path);

        /* -------- numeric parameters ----------------------------- */
        let network_id = json["network_id"].as_u64().unwrap_or(defaults.network_id);
        let cache_ttl_secs = json["cache_ttl_secs"]
            .as_u64()
            .unwrap_or(defaults.cache_ttl_secs);
        let abi_cache_ttl_secs = json["abi_cache_ttl_secs"]
            .as_u64()
            .unwrap_or(defaults.abi_cache_ttl_secs);
        let gas_multiplier = json["gas_multiplier"]
            .as_f64()
            .unwrap_or(defaults.gas_multiplier);
        let gas_price_multiplier = json["gas_price_multiplier"]
            .as_f64()
            .unwrap_or(defaults.gas_price_multiplier);
        let metadata_retry_delay_ms = json["metadata_retry_delay_ms"]
            .as_u64()
            .unwrap_or(defaults.metadata_retry_delay_ms);
        let metadata_max_attempts = json["metadata_max_attempts"]
            .as_u64()
            .map(|n| n.clamp(1, u32::MAX as u64) as u32)
            .unwrap_or(defaults.metadata_max_attempts);
        let http_timeout_secs = json["http_timeout_secs"]
            .as_u64()
            .unwrap_or(defaults.http_timeout_secs);

        Ok(Self {
            contract_address,
            network_id,
            explorer_api_url,
            explorer_api_key,
            storage_path,
            cache_ttl_secs,
            abi_cache_ttl_secs,
            gas_multiplier,
            gas_price_multiplier,
            metadata_retry_delay_ms,
            metadata_max_attempts,
            http_timeout_secs,
        })
    }

    /// --------------------------------------------------------------
    /// Load settings from default config/settings.json file, or the
    /// defaults when it does not exist, then apply env overrides.
    /// --------------------------------------------------------------
    pub fn load() -> Result<Self> {
        let mut settings = if Path::new(DEFAULT_SETTINGS_PATH).exists() {
            Self::load_from_file(DEFAULT_SETTINGS_PATH)?
        } else {
            Self::default()
        };
        settings.apply_env_overrides()?;
        Ok(settings)
    }

    /// --------------------------------------------------------------
    /// `PAPER_CATS_*` environment variables win over the file.
    /// --------------------------------------------------------------
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = env::var("PAPER_CATS_CONTRACT") {
            self.contract_address = v;
        }
        if let Ok(v) = env::var("PAPER_CATS_NETWORK_ID") {
            self.network_id = v
                .parse()
                .with_context(|| format!("PAPER_CATS_NETWORK_ID `{v}`"))?;
        }
        if let Ok(v) = env::var("PAPER_CATS_EXPLORER_API_URL") {
            self.explorer_api_url = Some(v);
        }
        if let Ok(v) = env::var("PAPER_CATS_EXPLORER_API_KEY") {
            self.explorer_api_key = Some(v);
        }
        if let Ok(v) = env::var("PAPER_CATS_STORAGE_PATH") {
            self.storage_path = PathBuf::from(v);
        }
        if let Ok(v) = env::var("PAPER_CATS_GAS_MULTIPLIER") {
            self.gas_multiplier = v
                .parse()
                .with_context(|| format!("PAPER_CATS_GAS_MULTIPLIER `{v}`"))?;
        }
        if let Ok(v) = env::var("PAPER_CATS_GAS_PRICE_MULTIPLIER") {
            self.gas_price_multiplier = v
                .parse()
                .with_context(|| format!("PAPER_CATS_GAS_PRICE_MULTIPLIER `{v}`"))?;
        }
        Ok(())
    }

    /// --------------------------------------------------------------
    /// Save settings to a specific file path.
    /// --------------------------------------------------------------
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json_string = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&path, json_string)
            .with_context(|| format!("writing settings to {:?}", path.as_ref()))?;
        Ok(())
    }

    /* ------------------------------ helpers ---------------------------- */
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn abi_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.abi_cache_ttl_secs)
    }

    pub fn metadata_retry_delay(&self) -> Duration {
        Duration::from_millis(self.metadata_retry_delay_ms)
    }

    pub fn gas_policy(&self) -> Result<GasPolicy> {
        GasPolicy::new(self.gas_multiplier, self.gas_price_multiplier)
            .context("invalid gas multipliers in settings")
    }

    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.http_timeout_secs))
            .build()
            .context("building http client")
    }
}
