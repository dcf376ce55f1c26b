//! Inspect and warm the Paper Cats cache from the command line.
//!
//! Usage:
//!   cargo run --bin paper-cats -- abi
//!   cargo run --bin paper-cats -- metadata --id 7 --uri https://.../7
//!   cargo run --bin paper-cats -- cache get 0xcafe-abi

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use serde_json::Value;

use paper_cats_client::{
    cache::{ExpiringCache, FileStorage},
    config::settings::Settings,
    contract::abi::AbiFetcher,
    metadata::MetadataLoader,
};

#[derive(Parser)]
#[command(name = "paper-cats", about = "Paper Cats cache and metadata tool")]
struct Cli {
    /// Settings file; defaults to config/settings.json when present.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch the contract ABI from the block explorer and cache it.
    Abi,
    /// Fetch one cat's metadata from its token URI, validate and cache it.
    Metadata {
        #[arg(long)]
        id: String,
        #[arg(long)]
        uri: String,
    },
    /// Read or write raw cache entries.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    Get {
        key: String,
    },
    Set {
        key: String,
        /// JSON value to store.
        value: String,
        /// Lifetime in seconds; the configured cache TTL when omitted.
        #[arg(long)]
        ttl: Option<u64>,
    },
    Remove {
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => {
            let mut settings = Settings::load_from_file(path)?;
            settings.apply_env_overrides()?;
            settings
        }
        None => Settings::load()?,
    };

    let storage = Arc::new(FileStorage::open(&settings.storage_path).with_context(|| {
        format!("opening cache store {:?}", settings.storage_path)
    })?);
    info!("📂 [CLI] using store {:?}", storage.path());
    let cache = Arc::new(ExpiringCache::new(storage).with_default_ttl(settings.cache_ttl()));

    match cli.command {
        Command::Abi => {
            anyhow::ensure!(
                !settings.contract_address.is_empty(),
                "contract_address is not configured"
            );
            let abi = AbiFetcher::new(settings.http_client()?, cache, settings.abi_cache_ttl())
                .with_base_url(settings.explorer_api_url.clone())
                .with_api_key(settings.explorer_api_key.clone())
                .load(settings.network_id, &settings.contract_address)
                .await?;
            println!("{}", serde_json::to_string_pretty(&abi)?);
        }
        Command::Metadata { id, uri } => {
            let metadata = MetadataLoader::new(
                settings.http_client()?,
                cache,
                settings.contract_address.clone(),
                settings.cache_ttl(),
            )
            .with_retry(settings.metadata_retry_delay(), settings.metadata_max_attempts)
            .load_from_uri(&id, &uri)
            .await?;
            println!("{}", serde_json::to_string_pretty(&metadata)?);
        }
        Command::Cache { action } => match action {
            CacheAction::Get { key } => match cache.get::<Value>(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => println!("{key}: not cached"),
            },
            CacheAction::Set { key, value, ttl } => {
                let value: Value = serde_json::from_str(&value)
                    .with_context(|| format!("value for {key} is not valid JSON"))?;
                cache.set(&key, &value, ttl.map(Duration::from_secs))?;
                println!("{key}: stored");
            }
            CacheAction::Remove { key } => {
                cache.remove(&key)?;
                println!("{key}: removed");
            }
        },
    }

    Ok(())
}
