//! ABI download from the Etherscan family of block explorers.

use std::{sync::Arc, time::Duration};

use log::{info, warn};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use url::Url;

use crate::{
    cache::ExpiringCache,
    error::{PaperCatsError, Result},
    utils::inflight::InFlight,
};

const NOTOK: &str = "NOTOK";

pub fn network_name(network_id: u64) -> Result<&'static str> {
    match network_id {
        1 => Ok("Main"),
        3 => Ok("Ropsten"),
        4 => Ok("Rinkeby"),
        5 => Ok("Goerli"),
        42 => Ok("Kovan"),
        137 => Ok("Polygon"),
        other => Err(PaperCatsError::UnsupportedNetwork(other)),
    }
}

/// `https://api.etherscan.io` for mainnet, `https://api-<network>.etherscan.io`
/// otherwise.
pub fn explorer_base_url(network_id: u64) -> Result<String> {
    let subdomain = match network_name(network_id)? {
        "Main" => "api".to_string(),
        name => format!("api-{}", name.to_lowercase()),
    };
    Ok(format!("https://{subdomain}.etherscan.io"))
}

pub fn abi_cache_key(contract_address: &str) -> String {
    format!("{contract_address}-abi")
}

pub struct AbiFetcher {
    client: Client,
    cache: Arc<ExpiringCache>,
    base_url_override: Option<String>,
    api_key: Option<String>,
    ttl: Duration,
    inflight: InFlight<Value>,
}

impl AbiFetcher {
    pub fn new(client: Client, cache: Arc<ExpiringCache>, ttl: Duration) -> Self {
        Self {
            client,
            cache,
            base_url_override: None,
            api_key: None,
            ttl,
            inflight: InFlight::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url_override = base_url;
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn abi_url(&self, network_id: u64, contract_address: &str) -> Result<Url> {
        let base = match &self.base_url_override {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => explorer_base_url(network_id)?,
        };

        let mut params = vec![
            ("module", "contract"),
            ("action", "getabi"),
            ("address", contract_address),
            ("format", "raw"),
        ];
        if let Some(key) = self.api_key.as_deref() {
            params.push(("apikey", key));
        }

        Url::parse_with_params(&format!("{base}/api"), &params)
            .map_err(|e| PaperCatsError::Network(format!("bad explorer url {base}: {e}")))
    }

    /// Cached ABI for `contract_address`, downloading it when missing.
    pub async fn load(&self, network_id: u64, contract_address: &str) -> Result<Value> {
        let key = abi_cache_key(contract_address);
        if let Some(abi) = self.cache.get::<Value>(&key) {
            return Ok(abi);
        }

        let url = self.abi_url(network_id, contract_address)?;
        let client = self.client.clone();
        let abi = self
            .inflight
            .run(&key, move || fetch_abi(client, url))
            .await?;

        if let Err(e) = self.cache.set(&key, &abi, Some(self.ttl)) {
            warn!("⚠️ [ABI] could not cache ABI for {}: {}", contract_address, e);
        }
        Ok(abi)
    }
}

async fn fetch_abi(client: Client, url: Url) -> Result<Value> {
    info!("🌐 [ABI] fetching {}", url);
    let res = client.get(url).send().await?;

    if res.status() != StatusCode::OK {
        return Err(PaperCatsError::Network(format!(
            "error connecting to block explorer: HTTP {}",
            res.status()
        )));
    }

    let json: Value = res
        .json()
        .await
        .map_err(|e| PaperCatsError::Explorer(format!("error parsing abi json: {e}")))?;

    if json.get("message").and_then(Value::as_str) == Some(NOTOK) {
        let reason = json
            .get("result")
            .and_then(Value::as_str)
            .unwrap_or("error parsing abi json");
        return Err(PaperCatsError::Explorer(reason.to_string()));
    }

    Ok(json)
}
