//! Catalog sync engine
//!
//! Reconciles the cache/registry with the upstream catalog on scheduler
//! ticks, one entity class at a time. New instruments are persisted first,
//! then cached, then announced to the fleet — that order guarantees a
//! registry failure leaves no cache mutation behind. A step failure aborts
//! only that class's batch; the next tick retries.

use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog::CatalogSource;
use crate::coordination::{CoordinationStore, StoreReply, keys};
use crate::models::{CacheEntry, EntityClass, Instrument, NewInstrument};
use crate::registry::{InstrumentRegistry, RegistryError};

/// Sync failure that aborts the current batch
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Per-class reconciliation of cache/registry against the upstream catalog
pub struct SyncEngine {
    store: Arc<dyn CoordinationStore>,
    registry: Arc<dyn InstrumentRegistry>,
    catalog: Arc<dyn CatalogSource>,
    cache_ttl_secs: i64,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        registry: Arc<dyn InstrumentRegistry>,
        catalog: Arc<dyn CatalogSource>,
        cache_ttl_secs: i64,
    ) -> Self {
        Self {
            store,
            registry,
            catalog,
            cache_ttl_secs,
        }
    }

    /// Discover and publish newly listed underlyings.
    ///
    /// Returns how many tokens were handed to the claim protocol.
    pub async fn sync_underlyings(&self) -> Result<u64, SyncError> {
        let current = self.current_underlyings().await?;
        let known: HashSet<&str> = current.iter().map(|entry| entry.token.as_str()).collect();

        let upstream = self.catalog.fetch_underlyings().await;
        if upstream.is_empty() {
            warn!("catalog returned no underlyings, skipping sync");
            return Ok(0);
        }

        let fresh: Vec<NewInstrument> = upstream
            .into_iter()
            .filter(|listed| !known.contains(listed.token.as_str()))
            .map(NewInstrument::from)
            .collect();
        if fresh.is_empty() {
            debug!("underlyings already in sync");
            return Ok(0);
        }

        let inserted = self.registry.insert_underlyings(fresh).await?;
        self.publish_batch(EntityClass::Underlying, keys::UNDERLYING_CACHE, &inserted)
            .await;
        Ok(inserted.len() as u64)
    }

    /// Discover and publish newly listed derivatives, per known underlying
    pub async fn sync_derivatives(&self) -> Result<u64, SyncError> {
        let parents = self.current_underlyings().await?;
        if parents.is_empty() {
            debug!("no underlyings known yet, skipping derivative sync");
            return Ok(0);
        }

        let mut published = 0;
        for parent in parents {
            published += self.sync_derivatives_of(&parent).await?;
        }
        Ok(published)
    }

    async fn sync_derivatives_of(&self, parent: &CacheEntry) -> Result<u64, SyncError> {
        let cache_key = keys::derivative_cache(&parent.token);
        let current = self
            .cached_entries_or_rebuild(&cache_key, || async {
                self.registry
                    .list_derivatives_by_underlying_token(&parent.token)
                    .await
            })
            .await?;
        let known: HashSet<&str> = current.iter().map(|entry| entry.token.as_str()).collect();

        let upstream = self.catalog.fetch_derivatives(&parent.token).await;
        let fresh: Vec<NewInstrument> = upstream
            .into_iter()
            .filter(|listed| !known.contains(listed.token.as_str()))
            .map(NewInstrument::from)
            .collect();
        if fresh.is_empty() {
            debug!("derivatives of {} already in sync", parent.token);
            return Ok(0);
        }

        let inserted = self
            .registry
            .insert_derivatives(fresh, parent.id)
            .await?;
        self.publish_batch(EntityClass::Derivative, &cache_key, &inserted)
            .await;
        Ok(inserted.len() as u64)
    }

    /// Cache-aside read of the underlying entries
    async fn current_underlyings(&self) -> Result<Vec<CacheEntry>, SyncError> {
        self.cached_entries_or_rebuild(keys::UNDERLYING_CACHE, || async {
            self.registry.list_underlyings().await
        })
        .await
    }

    /// Read a cache set, rebuilding it from the registry when cold or the
    /// store is unreachable
    async fn cached_entries_or_rebuild<F, Fut>(
        &self,
        cache_key: &str,
        load: F,
    ) -> Result<Vec<CacheEntry>, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Instrument>, RegistryError>>,
    {
        if let StoreReply::Value(members) = self.store.set_members(cache_key).await {
            if !members.is_empty() {
                return Ok(decode_members(cache_key, members));
            }
        }

        let rows = load().await?;
        let entries: Vec<CacheEntry> = rows.iter().map(CacheEntry::from_instrument).collect();
        if !entries.is_empty() {
            debug!("rebuilding cache set {cache_key} from registry");
            self.refresh_cache(cache_key, &entries).await;
        }
        Ok(entries)
    }

    /// Record freshly inserted rows in the cache and hand their tokens to the
    /// claim protocol in one pipelined add+publish
    async fn publish_batch(&self, class: EntityClass, cache_key: &str, inserted: &[Instrument]) {
        let entries: Vec<CacheEntry> = inserted.iter().map(CacheEntry::from_instrument).collect();
        self.refresh_cache(cache_key, &entries).await;

        let tokens: Vec<String> = inserted.iter().map(|row| row.token.clone()).collect();
        let announced = self
            .store
            .set_add_and_publish(
                &keys::pending_batch(class),
                &tokens,
                keys::NEW_INSTRUMENTS_CHANNEL,
                class.as_str(),
            )
            .await;
        if announced.is_unavailable() {
            // Rows are durable; the cold-cache path re-announces nothing, but
            // the next catalog tick will still find the registry consistent.
            warn!("pending batch for {class} not announced, store unreachable");
            return;
        }
        info!("published {} new {class} instruments", tokens.len());
    }

    async fn refresh_cache(&self, cache_key: &str, entries: &[CacheEntry]) {
        let members: Vec<String> = entries.iter().map(CacheEntry::encode).collect();
        if self.store.set_add(cache_key, &members).await.is_unavailable() {
            warn!("cache set {cache_key} not refreshed, store unreachable");
            return;
        }
        self.store.expire(cache_key, self.cache_ttl_secs).await;
    }
}

fn decode_members(cache_key: &str, members: HashSet<String>) -> Vec<CacheEntry> {
    let mut entries = Vec::with_capacity(members.len());
    for member in members {
        match CacheEntry::decode(&member) {
            Some(entry) => entries.push(entry),
            None => warn!("malformed member {member} in cache set {cache_key}"),
        }
    }
    entries
}
