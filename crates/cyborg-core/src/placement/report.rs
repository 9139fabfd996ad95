// ── Report client ──
//
// Owns the cached provider tree and serialises refresh-then-write
// sequences per root provider. Generation-guarded writes submit the cached
// generation; on a concurrent-update rejection the provider is refreshed
// and the write retried, up to `conflict_retries` times.
//
// Lock order: root lock, then the cache mutex. The cache mutex is never
// held across an HTTP call. `update_provider_tree` holds the root lock
// from refresh to flush, so concurrent editors of one root never see each
// other's providers as removals.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use cyborg_placement::{
    CreateProviderRequest, PlacementClient, ProviderInventories, ProviderTraits, ResourceProvider,
};
use dashmap::{DashMap, DashSet};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::tree::{Inventory, ProviderData, ProviderTree};
use crate::error::CoreError;

const CUSTOM_PREFIX: &str = "CUSTOM_";

/// Remote writes made by one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushCounts {
    pub created: usize,
    /// Providers whose inventory or traits were written.
    pub updated: usize,
    pub removed: usize,
}

impl FlushCounts {
    fn absorb(&mut self, other: Self) {
        self.created += other.created;
        self.updated += other.updated;
        self.removed += other.removed;
    }
}

pub struct ReportClient {
    api: PlacementClient,
    cache: Mutex<ProviderTree>,
    root_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    known_traits: DashSet<String>,
    known_classes: DashSet<String>,
    conflict_retries: u32,
}

fn not_found(uuid: &Uuid) -> CoreError {
    CoreError::ProviderNotFound {
        identifier: uuid.to_string(),
    }
}

impl ReportClient {
    pub fn new(api: PlacementClient, conflict_retries: u32) -> Self {
        Self {
            api,
            cache: Mutex::new(ProviderTree::new()),
            root_locks: DashMap::new(),
            known_traits: DashSet::new(),
            known_classes: DashSet::new(),
            conflict_retries,
        }
    }

    pub fn api(&self) -> &PlacementClient {
        &self.api
    }

    /// Deep copy of the whole cache.
    pub async fn cached_tree(&self) -> ProviderTree {
        self.cache.lock().await.clone()
    }

    async fn lock_root(&self, root: Uuid) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(&self.root_locks.entry(root).or_default());
        lock.lock_owned().await
    }

    /// Root of `uuid`, from the cache when possible.
    async fn root_of(&self, uuid: &Uuid) -> Result<Uuid, CoreError> {
        if let Some(root) = self.cache.lock().await.root_of(uuid) {
            return Ok(root);
        }
        let rp = self
            .api
            .get_provider(uuid)
            .await?
            .ok_or_else(|| not_found(uuid))?;
        Ok(rp.root_provider_uuid.unwrap_or(rp.uuid))
    }

    // ── Tree refresh ─────────────────────────────────────────────────

    /// Ensure `uuid` exists (creating it under `parent` if absent), refresh
    /// its tree, and return a deep copy of that tree.
    pub async fn get_provider_tree_and_ensure_root(
        &self,
        uuid: &Uuid,
        name: &str,
        parent: Option<&Uuid>,
    ) -> Result<ProviderTree, CoreError> {
        let root = self.lock_key(uuid, parent).await?;
        let _guard = self.lock_root(root).await;
        self.ensure_and_copy(uuid, name, parent).await
    }

    /// Ensure `uuid` like [`Self::get_provider_tree_and_ensure_root`], let
    /// `edit` turn the copy into the desired state, and flush it, all
    /// under one hold of the root lock.
    ///
    /// Providers of the tree that `edit` removes are deleted remotely.
    pub async fn update_provider_tree<F>(
        &self,
        uuid: &Uuid,
        name: &str,
        parent: Option<&Uuid>,
        edit: F,
    ) -> Result<FlushCounts, CoreError>
    where
        F: FnOnce(&mut ProviderTree) -> Result<(), CoreError> + Send,
    {
        let root = self.lock_key(uuid, parent).await?;
        let _guard = self.lock_root(root).await;

        let mut desired = self.ensure_and_copy(uuid, name, parent).await?;
        edit(&mut desired)?;
        let root = desired.root_of(uuid).ok_or_else(|| not_found(uuid))?;
        self.sync_tree(&desired, &root).await
    }

    async fn lock_key(&self, uuid: &Uuid, parent: Option<&Uuid>) -> Result<Uuid, CoreError> {
        match parent {
            Some(parent) => self.root_of(parent).await,
            None => Ok(*uuid),
        }
    }

    /// Caller holds the root lock.
    async fn ensure_and_copy(
        &self,
        uuid: &Uuid,
        name: &str,
        parent: Option<&Uuid>,
    ) -> Result<ProviderTree, CoreError> {
        self.ensure_provider(uuid, name, parent).await?;
        self.refresh_tree(uuid).await?;

        let cache = self.cache.lock().await;
        let root = cache.root_of(uuid).ok_or_else(|| not_found(uuid))?;
        Ok(cache.copy_tree(&root))
    }

    async fn ensure_provider(
        &self,
        uuid: &Uuid,
        name: &str,
        parent: Option<&Uuid>,
    ) -> Result<(), CoreError> {
        if self.api.get_provider(uuid).await?.is_some() {
            return Ok(());
        }
        let request = CreateProviderRequest {
            uuid: *uuid,
            name: name.to_owned(),
            parent_provider_uuid: parent.copied(),
        };
        self.create_remote(&request).await.map(|_| ())
    }

    async fn create_remote(
        &self,
        request: &CreateProviderRequest,
    ) -> Result<ResourceProvider, CoreError> {
        match self.api.create_provider(request).await {
            Ok(rp) => {
                info!(uuid = %rp.uuid, name = %rp.name, "created resource provider");
                Ok(rp)
            }
            // Lost a creation race; adopt the winner.
            Err(e) if e.is_conflict() => self
                .api
                .get_provider(&request.uuid)
                .await?
                .ok_or_else(|| CoreError::ProviderCreationFailed {
                    name: request.name.clone(),
                    reason: e.to_string(),
                }),
            Err(e) => Err(CoreError::ProviderCreationFailed {
                name: request.name.clone(),
                reason: e.to_string(),
            }),
        }
    }

    /// Re-read the tree containing `uuid`, then inventory and traits for
    /// `uuid` and everything beneath it.
    async fn refresh_tree(&self, uuid: &Uuid) -> Result<(), CoreError> {
        let listing = self.api.list_providers_in_tree(uuid).await?;
        let subtree = {
            let mut cache = self.cache.lock().await;
            cache.populate(&listing)?;
            cache.subtree(uuid)
        };
        for member in &subtree {
            self.refresh_provider_data(member).await?;
        }
        Ok(())
    }

    async fn refresh_provider_data(&self, uuid: &Uuid) -> Result<(), CoreError> {
        let inventories = self.api.get_inventories(uuid).await?;
        let traits = self.api.get_traits(uuid).await?;
        let mut cache = self.cache.lock().await;
        cache.update_inventory(
            uuid,
            inventories.inventories,
            Some(inventories.resource_provider_generation),
        )?;
        cache.update_traits(
            uuid,
            traits.traits.into_iter().collect(),
            Some(traits.resource_provider_generation),
        )
    }

    async fn ensure_cached(&self, uuid: &Uuid) -> Result<(), CoreError> {
        if self.cache.lock().await.contains(uuid) {
            return Ok(());
        }
        self.refresh_tree(uuid).await
    }

    // ── Desired-state flush ──────────────────────────────────────────

    /// Make Placement match `desired` for every tree `desired` has a root
    /// of: delete providers missing from it bottom-up, create new ones
    /// top-down, then flush changed inventory and traits.
    ///
    /// Not atomic. Calling again with the same tree converges.
    ///
    /// Removals are computed against the live cache, so a copy taken
    /// before another writer added providers under the same root deletes
    /// them. Use [`Self::update_provider_tree`] when writers share a root.
    pub async fn update_from_provider_tree(
        &self,
        desired: &ProviderTree,
    ) -> Result<FlushCounts, CoreError> {
        let mut counts = FlushCounts::default();
        for root in desired.roots() {
            let _guard = self.lock_root(root).await;
            counts.absorb(self.sync_tree(desired, &root).await?);
        }
        Ok(counts)
    }

    async fn sync_tree(&self, desired: &ProviderTree, root: &Uuid) -> Result<FlushCounts, CoreError> {
        let wanted = desired.tree_uuids(root);
        let wanted_set: HashSet<Uuid> = wanted.iter().copied().collect();
        let (cached, moved) = {
            let cache = self.cache.lock().await;
            // Reparented providers are recreated under their new parent.
            let moved: HashSet<Uuid> = wanted
                .iter()
                .filter(|u| match (desired.get(u), cache.get(u)) {
                    (Some(d), Some(c)) => d.parent_uuid != c.parent_uuid,
                    _ => false,
                })
                .copied()
                .collect();
            (cache.tree_uuids(root), moved)
        };
        let cached_set: HashSet<Uuid> = cached.iter().copied().collect();

        let mut counts = FlushCounts::default();
        for uuid in cached
            .iter()
            .rev()
            .filter(|u| !wanted_set.contains(*u) || moved.contains(*u))
        {
            self.delete_locked(uuid).await?;
            counts.removed += 1;
        }
        for uuid in wanted
            .iter()
            .filter(|u| !cached_set.contains(*u) || moved.contains(*u))
        {
            let data = desired.get(uuid).ok_or_else(|| not_found(uuid))?;
            self.create_cached(data).await?;
            counts.created += 1;
        }
        for uuid in &wanted {
            let data = desired.get(uuid).ok_or_else(|| not_found(uuid))?;
            let inventory = self.write_inventory(uuid, &data.inventory).await?;
            let traits = self.write_traits(uuid, &data.traits).await?;
            if inventory || traits {
                counts.updated += 1;
            }
        }
        Ok(counts)
    }

    async fn create_cached(&self, data: &ProviderData) -> Result<(), CoreError> {
        let request = CreateProviderRequest {
            uuid: data.uuid,
            name: data.name.clone(),
            parent_provider_uuid: data.parent_uuid,
        };
        let created = self.create_remote(&request).await?;

        let mut cache = self.cache.lock().await;
        match data.parent_uuid {
            None => cache.new_root(&data.name, data.uuid, created.generation),
            Some(parent) => cache.new_child(&data.name, data.uuid, &parent, created.generation),
        }
    }

    // ── Generation-guarded writes ────────────────────────────────────

    /// Returns whether anything was written.
    async fn write_inventory(&self, uuid: &Uuid, inventory: &Inventory) -> Result<bool, CoreError> {
        let mut attempts = 0;
        loop {
            let generation = {
                let cache = self.cache.lock().await;
                if !cache.has_inventory_changed(uuid, inventory)? {
                    return Ok(false);
                }
                cache.get(uuid).map_or(0, |p| p.generation)
            };
            let body = ProviderInventories {
                resource_provider_generation: generation,
                inventories: inventory.clone(),
            };
            match self.api.put_inventories(uuid, &body).await {
                Ok(updated) => {
                    debug!(provider = %uuid, generation = updated.resource_provider_generation, "inventory updated");
                    self.cache.lock().await.update_inventory(
                        uuid,
                        updated.inventories,
                        Some(updated.resource_provider_generation),
                    )?;
                    return Ok(true);
                }
                Err(e) if e.is_generation_conflict() && attempts < self.conflict_retries => {
                    attempts += 1;
                    warn!(provider = %uuid, generation, attempt = attempts, "inventory generation conflict, refreshing");
                    self.refresh_provider_data(uuid).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn write_traits(&self, uuid: &Uuid, traits: &BTreeSet<String>) -> Result<bool, CoreError> {
        let mut attempts = 0;
        loop {
            let generation = {
                let cache = self.cache.lock().await;
                if !cache.has_traits_changed(uuid, traits)? {
                    return Ok(false);
                }
                cache.get(uuid).map_or(0, |p| p.generation)
            };
            let names: Vec<String> = traits.iter().cloned().collect();
            self.ensure_traits(&names).await?;

            let body = ProviderTraits {
                resource_provider_generation: generation,
                traits: names,
            };
            match self.api.put_traits(uuid, &body).await {
                Ok(updated) => {
                    debug!(provider = %uuid, generation = updated.resource_provider_generation, "traits updated");
                    self.cache.lock().await.update_traits(
                        uuid,
                        updated.traits.into_iter().collect(),
                        Some(updated.resource_provider_generation),
                    )?;
                    return Ok(true);
                }
                Err(e) if e.is_generation_conflict() && attempts < self.conflict_retries => {
                    attempts += 1;
                    warn!(provider = %uuid, generation, attempt = attempts, "trait generation conflict, refreshing");
                    self.refresh_provider_data(uuid).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Replace the inventory of a cached provider.
    pub async fn set_inventory_for_provider(
        &self,
        uuid: &Uuid,
        inventory: &Inventory,
    ) -> Result<(), CoreError> {
        let root = self.root_of(uuid).await?;
        let _guard = self.lock_root(root).await;
        self.ensure_cached(uuid).await?;
        self.write_inventory(uuid, inventory).await.map(|_| ())
    }

    /// Replace the trait set of a provider, creating custom traits first.
    pub async fn set_traits_for_provider(
        &self,
        uuid: &Uuid,
        traits: &BTreeSet<String>,
    ) -> Result<(), CoreError> {
        let root = self.root_of(uuid).await?;
        let _guard = self.lock_root(root).await;
        self.ensure_cached(uuid).await?;
        self.write_traits(uuid, traits).await.map(|_| ())
    }

    /// Add `traits` to whatever the provider already has.
    pub async fn add_traits_to_provider(&self, uuid: &Uuid, traits: &[String]) -> Result<(), CoreError> {
        let root = self.root_of(uuid).await?;
        let _guard = self.lock_root(root).await;
        self.ensure_cached(uuid).await?;
        self.refresh_provider_data(uuid).await?;

        let mut merged = self.current_traits(uuid).await?;
        merged.extend(traits.iter().cloned());
        self.write_traits(uuid, &merged).await.map(|_| ())
    }

    /// Drop every trait starting with one of `prefixes`.
    pub async fn delete_traits_with_prefixes(
        &self,
        uuid: &Uuid,
        prefixes: &[&str],
    ) -> Result<(), CoreError> {
        let root = self.root_of(uuid).await?;
        let _guard = self.lock_root(root).await;
        self.ensure_cached(uuid).await?;
        self.refresh_provider_data(uuid).await?;

        let mut remaining = self.current_traits(uuid).await?;
        remaining.retain(|t| !prefixes.iter().any(|p| t.starts_with(p)));
        self.write_traits(uuid, &remaining).await.map(|_| ())
    }

    async fn current_traits(&self, uuid: &Uuid) -> Result<BTreeSet<String>, CoreError> {
        self.cache
            .lock()
            .await
            .get(uuid)
            .map(|p| p.traits.clone())
            .ok_or_else(|| not_found(uuid))
    }

    // ── Deletion ─────────────────────────────────────────────────────

    async fn delete_locked(&self, uuid: &Uuid) -> Result<(), CoreError> {
        match self.api.delete_provider(uuid).await {
            Ok(()) => info!(uuid = %uuid, "deleted resource provider"),
            Err(e) if e.is_not_found() => debug!(uuid = %uuid, "resource provider already absent"),
            Err(e) => return Err(e.into()),
        }
        self.cache.lock().await.remove(uuid);
        Ok(())
    }

    /// Delete one provider. Absence counts as success; a provider with
    /// allocations or children fails with `ProviderInUse`.
    pub async fn delete_provider(&self, uuid: &Uuid) -> Result<(), CoreError> {
        let root = match self.root_of(uuid).await {
            Ok(root) => root,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        let _guard = self.lock_root(root).await;
        self.delete_locked(uuid).await
    }

    /// Delete `uuid` and all of its descendants, bottom-up. Returns how
    /// many providers were visited.
    pub async fn delete_provider_subtree(&self, uuid: &Uuid) -> Result<usize, CoreError> {
        let root = match self.root_of(uuid).await {
            Ok(root) => root,
            Err(e) if e.is_not_found() => return Ok(0),
            Err(e) => return Err(e),
        };
        let _guard = self.lock_root(root).await;

        let listing = self.api.list_providers_in_tree(uuid).await?;
        let mut doomed = {
            let mut cache = self.cache.lock().await;
            cache.populate(&listing)?;
            cache.subtree(uuid)
        };
        doomed.reverse();
        for member in &doomed {
            self.delete_locked(member).await?;
        }
        Ok(doomed.len())
    }

    // ── Lookups and catalog ──────────────────────────────────────────

    pub async fn find_provider_by_name(&self, name: &str) -> Result<Option<ResourceProvider>, CoreError> {
        Ok(self.api.list_providers_by_name(name).await?.into_iter().next())
    }

    pub async fn providers_in_tree(&self, uuid: &Uuid) -> Result<Vec<ResourceProvider>, CoreError> {
        Ok(self.api.list_providers_in_tree(uuid).await?)
    }

    /// Create any `CUSTOM_` resource classes not yet seen. Standard classes
    /// always exist.
    pub async fn ensure_resource_classes(&self, classes: &[&str]) -> Result<(), CoreError> {
        for class in classes {
            if !class.starts_with(CUSTOM_PREFIX) || self.known_classes.contains(*class) {
                continue;
            }
            if self.api.ensure_resource_class(class).await? {
                info!(class, "created custom resource class");
            }
            self.known_classes.insert((*class).to_owned());
        }
        Ok(())
    }

    /// Create any `CUSTOM_` traits not yet seen.
    pub async fn ensure_traits(&self, traits: &[String]) -> Result<(), CoreError> {
        for name in traits {
            if !name.starts_with(CUSTOM_PREFIX) || self.known_traits.contains(name) {
                continue;
            }
            if self.api.ensure_trait(name).await? {
                info!(name = %name, "created custom trait");
            }
            self.known_traits.insert(name.clone());
        }
        Ok(())
    }
}
