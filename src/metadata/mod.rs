//! Per-token metadata: `tokenURI(id)` resolved over HTTP and cached.
//!
//! Right after a mint the metadata server may not have indexed the new token
//! yet and answers without `attributes`. That case is retried after a fixed
//! delay instead of being reported straight away.

use std::{sync::Arc, time::Duration};

use log::{info, warn};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    cache::ExpiringCache,
    contract::ContractHandle,
    error::{PaperCatsError, Result},
    utils::inflight::InFlight,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub trait_type: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperCatMetadata {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    pub attributes: Vec<Attribute>,
}

pub fn token_uri_key(contract_address: &str, token_id: &str) -> String {
    format!("{contract_address}-{token_id}-tokenUri")
}

pub fn metadata_key(contract_address: &str, token_id: &str) -> String {
    format!("{contract_address}-{token_id}-metadata")
}

#[derive(Clone)]
struct Resolver {
    client: Client,
    cache: Arc<ExpiringCache>,
    contract_address: String,
    ttl: Duration,
    retry_delay: Duration,
    max_attempts: u32,
}

pub struct MetadataLoader {
    resolver: Resolver,
    inflight: InFlight<PaperCatMetadata>,
}

impl MetadataLoader {
    pub fn new(
        client: Client,
        cache: Arc<ExpiringCache>,
        contract_address: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            resolver: Resolver {
                client,
                cache,
                contract_address: contract_address.into(),
                ttl,
                retry_delay: Duration::from_secs(5),
                max_attempts: 3,
            },
            inflight: InFlight::new(),
        }
    }

    /// Delay between attempts and total attempts for metadata that is
    /// missing its attributes.
    pub fn with_retry(mut self, delay: Duration, max_attempts: u32) -> Self {
        self.resolver.retry_delay = delay;
        self.resolver.max_attempts = max_attempts.max(1);
        self
    }

    pub fn cached(&self, token_id: &str) -> Option<PaperCatMetadata> {
        self.resolver
            .cache
            .get(&metadata_key(&self.resolver.contract_address, token_id))
    }

    pub async fn load(&self, contract: &ContractHandle, token_id: &str) -> Result<PaperCatMetadata> {
        if let Some(metadata) = self.cached(token_id) {
            return Ok(metadata);
        }

        let key = metadata_key(&self.resolver.contract_address, token_id);
        let resolver = self.resolver.clone();
        let contract = contract.clone();
        let token_id = token_id.to_string();
        self.inflight
            .run(&key, move || async move { resolver.resolve(&contract, &token_id).await })
            .await
    }

    /// Same as [`MetadataLoader::load`] for a token URI obtained elsewhere.
    pub async fn load_from_uri(&self, token_id: &str, uri: &str) -> Result<PaperCatMetadata> {
        if let Some(metadata) = self.cached(token_id) {
            return Ok(metadata);
        }

        let uri_key = token_uri_key(&self.resolver.contract_address, token_id);
        if let Err(e) = self.resolver.cache.set(&uri_key, &uri, Some(self.resolver.ttl)) {
            warn!("⚠️ [METADATA] could not cache token uri for #{}: {}", token_id, e);
        }

        let key = metadata_key(&self.resolver.contract_address, token_id);
        let resolver = self.resolver.clone();
        let token_id = token_id.to_string();
        let uri = uri.to_string();
        self.inflight
            .run(&key, move || async move { resolver.fetch(&uri, &token_id).await })
            .await
    }
}

impl Resolver {
    async fn resolve(&self, contract: &ContractHandle, token_id: &str) -> Result<PaperCatMetadata> {
        let uri = self.token_uri(contract, token_id).await?;
        self.fetch(&uri, token_id).await
    }

    async fn fetch(&self, uri: &str, token_id: &str) -> Result<PaperCatMetadata> {
        let mut attempt = 1;
        loop {
            match fetch_metadata(&self.client, uri, token_id).await {
                Ok(metadata) => {
                    let key = metadata_key(&self.contract_address, token_id);
                    if let Err(e) = self.cache.set(&key, &metadata, Some(self.ttl)) {
                        warn!("⚠️ [METADATA] could not cache #{}: {}", token_id, e);
                    }
                    return Ok(metadata);
                }
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        "⏳ [METADATA] #{} not ready ({}), retrying in {:?} ({}/{})",
                        token_id, e, self.retry_delay, attempt, self.max_attempts
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn token_uri(&self, contract: &ContractHandle, token_id: &str) -> Result<String> {
        let key = token_uri_key(&self.contract_address, token_id);
        if let Some(uri) = self.cache.get::<String>(&key) {
            return Ok(uri);
        }

        let uri = contract.token_uri(token_id).await?;
        if let Err(e) = self.cache.set(&key, &uri, Some(self.ttl)) {
            warn!("⚠️ [METADATA] could not cache token uri for #{}: {}", token_id, e);
        }
        Ok(uri)
    }
}

async fn fetch_metadata(client: &Client, uri: &str, token_id: &str) -> Result<PaperCatMetadata> {
    info!("🌐 [METADATA] fetching #{} from {}", token_id, uri);
    let res = client.get(uri).send().await?;
    if res.status() != StatusCode::OK {
        return Err(PaperCatsError::Network(format!(
            "invalid response from metadata server: HTTP {}",
            res.status()
        )));
    }

    let mut json: Value = res.json().await.map_err(|e| {
        PaperCatsError::Network(format!("unreadable metadata for #{token_id}: {e}"))
    })?;

    let object = json
        .as_object_mut()
        .ok_or_else(|| PaperCatsError::MetadataShape {
            token_id: token_id.to_string(),
            reason: "expected a json object".to_string(),
        })?;
    if object.get("attributes").map_or(true, Value::is_null) {
        return Err(PaperCatsError::MetadataShape {
            token_id: token_id.to_string(),
            reason: "attributes missing".to_string(),
        });
    }
    object.insert("id".to_string(), Value::String(token_id.to_string()));

    serde_json::from_value(json).map_err(|e| PaperCatsError::MetadataShape {
        token_id: token_id.to_string(),
        reason: e.to_string(),
    })
}
