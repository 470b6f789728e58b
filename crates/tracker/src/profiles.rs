//! Profile resolution: local cache first, remote batch fallback.
//!
//! Ranked entries are decorated with display names and avatar URLs. Lookups
//! hit a SQLite cache keyed by address; misses are fetched remotely in one
//! batch (metadata rows from the indexer, preview images from the avatar
//! batch endpoint) and written back. Remote failures degrade to whatever
//! the cache already holds: a score row without a name is still a valid
//! row.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use alloy_primitives::Address;
use anyhow::{Context, Result};
use rally_core::Profile;
use serde::Deserialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{info, warn};

use crate::client::{IndexerClient, ProfileRow};

/// SQLite-backed profile cache.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    pool: SqlitePool,
}

impl ProfileStore {
    /// Open (creating if missing) the cache at the given database URL.
    pub async fn new(database_url: &str) -> Result<Self> {
        info!("Connecting to profile cache: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .min_connections(1)
            .connect_with(options)
            .await
            .context("Failed to connect to profile cache")?;

        Ok(Self { pool })
    }

    /// Open the cache at a specific file path.
    pub async fn new_with_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let database_url = format!("sqlite://{}", path.as_ref().display());
        Self::new(&database_url).await
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run profile cache migrations")?;
        Ok(())
    }

    /// Fetch cached profiles for the given addresses.
    ///
    /// Addresses with no cached row are simply absent from the result.
    pub async fn get_many(&self, addresses: &[Address]) -> Result<HashMap<Address, Profile>> {
        let mut found = HashMap::new();
        for address in addresses {
            let row = sqlx::query(
                "SELECT name, avatar_url, cid_v0 FROM profiles WHERE address = ?",
            )
            .bind(cache_key(address))
            .fetch_optional(&self.pool)
            .await
            .context("Failed to read profile cache")?;

            if let Some(row) = row {
                found.insert(
                    *address,
                    Profile {
                        name: row.get("name"),
                        avatar_url: row.get("avatar_url"),
                        cid_v0: row.get("cid_v0"),
                    },
                );
            }
        }
        Ok(found)
    }

    /// Upsert a batch of resolved profiles.
    pub async fn put_many(&self, entries: &[(Address, Profile)]) -> Result<()> {
        for (address, profile) in entries {
            sqlx::query(
                r#"
                INSERT INTO profiles (address, name, avatar_url, cid_v0)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(address) DO UPDATE SET
                    name = excluded.name,
                    avatar_url = excluded.avatar_url,
                    cid_v0 = excluded.cid_v0
                "#,
            )
            .bind(cache_key(address))
            .bind(profile.name.as_deref())
            .bind(profile.avatar_url.as_deref())
            .bind(profile.cid_v0.as_deref())
            .execute(&self.pool)
            .await
            .context("Failed to write profile cache")?;
        }
        Ok(())
    }

    /// Number of cached profiles.
    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM profiles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn cache_key(address: &Address) -> String {
    format!("{:#x}", address)
}

/// Cache-first batch resolver.
pub struct ProfileResolver {
    store: ProfileStore,
    client: Arc<IndexerClient>,
    http: reqwest::Client,
    batch_url: String,
    // Serializes remote fetches so overlapping lookups for the same address
    // set cannot duplicate in-flight requests.
    fetch_guard: tokio::sync::Mutex<()>,
}

#[derive(Debug, Deserialize)]
struct AvatarPreview {
    #[serde(rename = "previewImageUrl")]
    preview_image_url: Option<String>,
}

impl ProfileResolver {
    /// Create a resolver over a cache, an indexer client, and the avatar
    /// batch endpoint.
    pub fn new(store: ProfileStore, client: Arc<IndexerClient>, batch_url: impl Into<String>) -> Self {
        Self {
            store,
            client,
            http: reqwest::Client::new(),
            batch_url: batch_url.into(),
            fetch_guard: tokio::sync::Mutex::new(()),
        }
    }

    /// Resolve profiles for an address set, cache-first.
    ///
    /// Always returns what it can: a remote failure is logged and the
    /// result degrades to cache hits only. Addresses with no profile at all
    /// are absent from the map.
    pub async fn resolve_batch(&self, addresses: &[Address]) -> Result<HashMap<Address, Profile>> {
        if addresses.is_empty() {
            return Ok(HashMap::new());
        }

        let _guard = self.fetch_guard.lock().await;

        let mut resolved = self.store.get_many(addresses).await?;
        let misses: Vec<Address> = addresses
            .iter()
            .filter(|addr| !resolved.contains_key(*addr))
            .copied()
            .collect();
        if misses.is_empty() {
            return Ok(resolved);
        }

        let rows = match self.client.profile_rows(&misses).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Profile metadata fetch failed, serving cache only: {}", e);
                return Ok(resolved);
            }
        };

        let avatars = self.fetch_avatar_previews(&rows).await;

        let fresh: Vec<(Address, Profile)> = rows
            .iter()
            .map(|row| {
                (
                    row.address,
                    Profile {
                        name: row.name.clone(),
                        avatar_url: avatars.get(&row.address).cloned(),
                        cid_v0: row.cid_v0.clone(),
                    },
                )
            })
            .collect();

        self.store.put_many(&fresh).await?;
        resolved.extend(fresh);

        Ok(resolved)
    }

    /// Fetch preview image URLs for the rows that carry a CID.
    ///
    /// The batch endpoint answers positionally in the order of the `cids`
    /// query parameter, so alignment is kept against the CID list, not the
    /// full row list. Failures degrade to an empty map.
    async fn fetch_avatar_previews(&self, rows: &[ProfileRow]) -> HashMap<Address, String> {
        let with_cids: Vec<(&Address, &str)> = rows
            .iter()
            .filter_map(|row| row.cid_v0.as_deref().map(|cid| (&row.address, cid)))
            .collect();
        if with_cids.is_empty() {
            return HashMap::new();
        }

        let joined = with_cids
            .iter()
            .map(|(_, cid)| *cid)
            .collect::<Vec<_>>()
            .join(",");

        let response = self
            .http
            .get(&self.batch_url)
            .query(&[("cids", joined.as_str())])
            .send()
            .await
            .and_then(|r| r.error_for_status());

        let previews: Vec<Option<AvatarPreview>> = match response {
            Ok(response) => match response.json().await {
                Ok(previews) => previews,
                Err(e) => {
                    warn!("Failed to decode avatar batch response: {}", e);
                    return HashMap::new();
                }
            },
            Err(e) => {
                warn!("Avatar batch request failed: {}", e);
                return HashMap::new();
            }
        };

        with_cids
            .iter()
            .zip(previews)
            .filter_map(|((address, _), preview)| {
                preview
                    .and_then(|p| p.preview_image_url)
                    .map(|url| (**address, url))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    async fn setup_store() -> (ProfileStore, NamedTempFile) {
        let temp_db = NamedTempFile::new().unwrap();
        let store = ProfileStore::new_with_path(temp_db.path()).await.unwrap();
        store.run_migrations().await.unwrap();
        (store, temp_db)
    }

    fn profile(name: &str) -> Profile {
        Profile {
            name: Some(name.to_string()),
            avatar_url: Some(format!("https://img.example/{name}.png")),
            cid_v0: Some(format!("Qm{name}")),
        }
    }

    #[tokio::test]
    async fn test_store_round_trip() {
        let (store, _temp_db) = setup_store().await;
        let a = Address::repeat_byte(0x01);
        let b = Address::repeat_byte(0x02);

        store.put_many(&[(a, profile("alice"))]).await.unwrap();

        let found = store.get_many(&[a, b]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[&a].name.as_deref(), Some("alice"));
        assert!(!found.contains_key(&b));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_store_upsert_overwrites() {
        let (store, _temp_db) = setup_store().await;
        let a = Address::repeat_byte(0x01);

        store.put_many(&[(a, profile("old"))]).await.unwrap();
        store.put_many(&[(a, profile("new"))]).await.unwrap();

        let found = store.get_many(&[a]).await.unwrap();
        assert_eq!(found[&a].name.as_deref(), Some("new"));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_resolver_serves_cache_without_remote() {
        let (store, _temp_db) = setup_store().await;
        let a = Address::repeat_byte(0x01);
        store.put_many(&[(a, profile("alice"))]).await.unwrap();

        // Unreachable endpoints: the cache hit must make them irrelevant.
        let client = Arc::new(IndexerClient::new("http://127.0.0.1:1/rpc", 1000));
        let resolver = ProfileResolver::new(store, client, "http://127.0.0.1:1/batch");

        let resolved = resolver.resolve_batch(&[a]).await.unwrap();
        assert_eq!(resolved[&a].name.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_resolver_empty_input() {
        let (store, _temp_db) = setup_store().await;
        let client = Arc::new(IndexerClient::new("http://127.0.0.1:1/rpc", 1000));
        let resolver = ProfileResolver::new(store, client, "http://127.0.0.1:1/batch");

        let resolved = resolver.resolve_batch(&[]).await.unwrap();
        assert!(resolved.is_empty());
    }
}
