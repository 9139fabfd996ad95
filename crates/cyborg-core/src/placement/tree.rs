// ── Provider tree ──
//
// In-memory mirror of Placement's provider forest with inventory and
// traits. Providers are kept in insertion order, and a child is only ever
// inserted after its parent, so iteration order is always top-down.
//
// `Clone` is a deep copy: callers take a copy, edit it into the desired
// state, and hand it back to the report client.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use cyborg_placement::{InventoryRecord, ResourceProvider};
use indexmap::IndexMap;
use serde::Serialize;
use uuid::Uuid;

use crate::error::CoreError;

/// Resource class → inventory record.
pub type Inventory = BTreeMap<String, InventoryRecord>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderData {
    pub uuid: Uuid,
    pub name: String,
    pub parent_uuid: Option<Uuid>,
    pub root_uuid: Uuid,
    pub generation: u64,
    pub inventory: Inventory,
    pub traits: BTreeSet<String>,
}

impl ProviderData {
    fn bare(uuid: Uuid, name: String, parent_uuid: Option<Uuid>, root_uuid: Uuid, generation: u64) -> Self {
        Self {
            uuid,
            name,
            parent_uuid,
            root_uuid,
            generation,
            inventory: Inventory::new(),
            traits: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProviderTree {
    providers: IndexMap<Uuid, ProviderData>,
}

fn not_cached(uuid: &Uuid) -> CoreError {
    CoreError::ProviderNotFound {
        identifier: uuid.to_string(),
    }
}

impl ProviderTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn contains(&self, uuid: &Uuid) -> bool {
        self.providers.contains_key(uuid)
    }

    pub fn get(&self, uuid: &Uuid) -> Option<&ProviderData> {
        self.providers.get(uuid)
    }

    fn get_mut(&mut self, uuid: &Uuid) -> Result<&mut ProviderData, CoreError> {
        self.providers.get_mut(uuid).ok_or_else(|| not_cached(uuid))
    }

    /// Providers in top-down order.
    pub fn iter(&self) -> impl Iterator<Item = &ProviderData> {
        self.providers.values()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&ProviderData> {
        self.providers.values().find(|p| p.name == name)
    }

    /// Direct children of `uuid`.
    pub fn children<'a>(&'a self, uuid: &'a Uuid) -> impl Iterator<Item = &'a ProviderData> + 'a {
        self.providers
            .values()
            .filter(move |p| p.parent_uuid.as_ref() == Some(uuid))
    }

    pub fn roots(&self) -> Vec<Uuid> {
        self.providers
            .values()
            .filter(|p| p.parent_uuid.is_none())
            .map(|p| p.uuid)
            .collect()
    }

    pub fn root_of(&self, uuid: &Uuid) -> Option<Uuid> {
        self.providers.get(uuid).map(|p| p.root_uuid)
    }

    // ── Structure ────────────────────────────────────────────────────

    pub fn new_root(&mut self, name: &str, uuid: Uuid, generation: u64) -> Result<(), CoreError> {
        if self.contains(&uuid) {
            return Err(CoreError::ValidationFailed {
                message: format!("provider {uuid} ({name}) is already in the tree"),
            });
        }
        self.providers
            .insert(uuid, ProviderData::bare(uuid, name.to_owned(), None, uuid, generation));
        Ok(())
    }

    pub fn new_child(
        &mut self,
        name: &str,
        uuid: Uuid,
        parent: &Uuid,
        generation: u64,
    ) -> Result<(), CoreError> {
        if self.contains(&uuid) {
            return Err(CoreError::ValidationFailed {
                message: format!("provider {uuid} ({name}) is already in the tree"),
            });
        }
        let root = self.root_of(parent).ok_or_else(|| not_cached(parent))?;
        self.providers.insert(
            uuid,
            ProviderData::bare(uuid, name.to_owned(), Some(*parent), root, generation),
        );
        Ok(())
    }

    /// `uuid` followed by all of its descendants, top-down. Empty if
    /// `uuid` is not cached.
    pub fn subtree(&self, uuid: &Uuid) -> Vec<Uuid> {
        if !self.contains(uuid) {
            return Vec::new();
        }
        let mut members: HashSet<Uuid> = HashSet::from([*uuid]);
        let mut order = vec![*uuid];
        for p in self.providers.values() {
            if let Some(parent) = p.parent_uuid {
                if members.contains(&parent) && members.insert(p.uuid) {
                    order.push(p.uuid);
                }
            }
        }
        order
    }

    /// Every provider sharing `root`, top-down.
    pub fn tree_uuids(&self, root: &Uuid) -> Vec<Uuid> {
        self.providers
            .values()
            .filter(|p| p.root_uuid == *root)
            .map(|p| p.uuid)
            .collect()
    }

    /// Deep copy of the tree rooted at `root`.
    pub fn copy_tree(&self, root: &Uuid) -> Self {
        Self {
            providers: self
                .providers
                .iter()
                .filter(|(_, p)| p.root_uuid == *root)
                .map(|(u, p)| (*u, p.clone()))
                .collect(),
        }
    }

    /// Remove `uuid` and its descendants. Returns the removed UUIDs
    /// bottom-up.
    pub fn remove(&mut self, uuid: &Uuid) -> Vec<Uuid> {
        let mut removed = self.subtree(uuid);
        removed.reverse();
        for u in &removed {
            self.providers.shift_remove(u);
        }
        removed
    }

    /// Replace the cached trees touched by `listing` with its contents.
    ///
    /// Providers that stay keep their cached inventory and traits; cached
    /// members of those trees missing from the listing are dropped.
    pub fn populate(&mut self, listing: &[ResourceProvider]) -> Result<(), CoreError> {
        let listed: HashSet<Uuid> = listing.iter().map(|rp| rp.uuid).collect();
        let roots: HashSet<Uuid> = listing
            .iter()
            .map(|rp| rp.root_provider_uuid.unwrap_or(rp.uuid))
            .collect();

        let mut kept: BTreeMap<Uuid, ProviderData> = BTreeMap::new();
        let stale: Vec<Uuid> = self
            .providers
            .values()
            .filter(|p| roots.contains(&p.root_uuid) || listed.contains(&p.uuid))
            .map(|p| p.uuid)
            .collect();
        for uuid in stale {
            if let Some(data) = self.providers.shift_remove(&uuid) {
                kept.insert(uuid, data);
            }
        }

        // Parents before children, whatever order Placement returned.
        let mut pending: Vec<&ResourceProvider> = listing.iter().collect();
        while !pending.is_empty() {
            let before = pending.len();
            let mut deferred = Vec::new();
            for rp in pending {
                let ready = rp.parent_provider_uuid.is_none_or(|p| self.contains(&p));
                if !ready {
                    deferred.push(rp);
                    continue;
                }
                let root = rp.root_provider_uuid.unwrap_or(rp.uuid);
                let mut data = kept.remove(&rp.uuid).unwrap_or_else(|| {
                    ProviderData::bare(rp.uuid, rp.name.clone(), rp.parent_provider_uuid, root, rp.generation)
                });
                data.name.clone_from(&rp.name);
                data.parent_uuid = rp.parent_provider_uuid;
                data.root_uuid = root;
                data.generation = rp.generation;
                self.providers.insert(rp.uuid, data);
            }
            if deferred.len() == before {
                return Err(CoreError::ValidationFailed {
                    message: format!(
                        "provider listing has {} entries whose parent is missing",
                        deferred.len()
                    ),
                });
            }
            pending = deferred;
        }
        Ok(())
    }

    // ── Generation, inventory, traits ────────────────────────────────

    pub fn set_generation(&mut self, uuid: &Uuid, generation: u64) -> Result<(), CoreError> {
        self.get_mut(uuid)?.generation = generation;
        Ok(())
    }

    pub fn has_inventory_changed(&self, uuid: &Uuid, inventory: &Inventory) -> Result<bool, CoreError> {
        let data = self.providers.get(uuid).ok_or_else(|| not_cached(uuid))?;
        Ok(data.inventory != *inventory)
    }

    /// Replace the inventory; also adopt `generation` when it is known.
    pub fn update_inventory(
        &mut self,
        uuid: &Uuid,
        inventory: Inventory,
        generation: Option<u64>,
    ) -> Result<(), CoreError> {
        let data = self.get_mut(uuid)?;
        data.inventory = inventory;
        if let Some(generation) = generation {
            data.generation = generation;
        }
        Ok(())
    }

    pub fn has_traits_changed(&self, uuid: &Uuid, traits: &BTreeSet<String>) -> Result<bool, CoreError> {
        let data = self.providers.get(uuid).ok_or_else(|| not_cached(uuid))?;
        Ok(data.traits != *traits)
    }

    pub fn update_traits(
        &mut self,
        uuid: &Uuid,
        traits: BTreeSet<String>,
        generation: Option<u64>,
    ) -> Result<(), CoreError> {
        let data = self.get_mut(uuid)?;
        data.traits = traits;
        if let Some(generation) = generation {
            data.generation = generation;
        }
        Ok(())
    }
}
