// ── Layered set diff ──
//
// Each layer of the device tree is diffed as a set keyed by identity.
// `diff_layer` is the single generic engine; `layers` supplies the
// per-layer identity and dirty-field functions.
//
// Output order is deterministic: matched and added entries follow the new
// list, deleted entries follow the old list.

mod layers;

use indexmap::IndexMap;
use serde::Serialize;
use strum::Display;
use thiserror::Error;

pub use layers::{
    attach_handle_dirty, attribute_dirty, deployable_dirty, device_dirty, diff_attach_handles,
    diff_attributes, diff_deployables, diff_devices,
};

/// The four nested entity layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Device,
    Deployable,
    Attribute,
    AttachHandle,
}

/// Malformed input. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiffError {
    #[error("{layer} at position {position} of the {side} list has an empty identity")]
    MissingIdentity {
        layer: Layer,
        side: Side,
        position: usize,
    },

    #[error("duplicate {layer} key '{key}' in the {side} list")]
    DuplicateKey { layer: Layer, side: Side, key: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Side {
    Old,
    New,
}

/// An identity present on both sides.
#[derive(Debug)]
pub struct Matched<'a, O, N> {
    pub key: String,
    pub old: &'a O,
    pub new: &'a N,
    pub dirty: bool,
}

/// Result of diffing one layer.
#[derive(Debug)]
pub struct LayerDiff<'a, O, N> {
    pub same: Vec<Matched<'a, O, N>>,
    pub added: Vec<(String, &'a N)>,
    pub deleted: Vec<(String, &'a O)>,
}

impl<O, N> LayerDiff<'_, O, N> {
    pub fn same_keys(&self) -> impl Iterator<Item = &str> {
        self.same.iter().map(|m| m.key.as_str())
    }

    pub fn added_keys(&self) -> impl Iterator<Item = &str> {
        self.added.iter().map(|(k, _)| k.as_str())
    }

    pub fn deleted_keys(&self) -> impl Iterator<Item = &str> {
        self.deleted.iter().map(|(k, _)| k.as_str())
    }

    pub fn dirty_count(&self) -> usize {
        self.same.iter().filter(|m| m.dirty).count()
    }

    /// True when nothing was added, deleted, or changed at this layer.
    pub fn is_clean(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty() && self.dirty_count() == 0
    }
}

fn index_by_key<'a, T>(
    layer: Layer,
    side: Side,
    items: &'a [T],
    key_fn: &impl Fn(&T) -> String,
) -> Result<IndexMap<String, &'a T>, DiffError> {
    let mut map = IndexMap::with_capacity(items.len());
    for (position, item) in items.iter().enumerate() {
        let key = key_fn(item);
        if key.is_empty() {
            return Err(DiffError::MissingIdentity {
                layer,
                side,
                position,
            });
        }
        if map.insert(key.clone(), item).is_some() {
            return Err(DiffError::DuplicateKey { layer, side, key });
        }
    }
    Ok(map)
}

/// Diff two lists keyed by identity.
///
/// `same = keys(old) ∩ keys(new)`, `added = keys(new) − same`,
/// `deleted = keys(old) − same`. Matched entries are flagged dirty when
/// `is_dirty` reports a compared field differs. Performs no I/O.
pub fn diff_layer<'a, O, N>(
    layer: Layer,
    old: &'a [O],
    new: &'a [N],
    old_key: impl Fn(&O) -> String,
    new_key: impl Fn(&N) -> String,
    is_dirty: impl Fn(&O, &N) -> bool,
) -> Result<LayerDiff<'a, O, N>, DiffError> {
    let old_map = index_by_key(layer, Side::Old, old, &old_key)?;
    let new_map = index_by_key(layer, Side::New, new, &new_key)?;

    let mut same = Vec::new();
    let mut added = Vec::new();
    for (key, new_item) in &new_map {
        match old_map.get(key) {
            Some(old_item) => same.push(Matched {
                key: key.clone(),
                old: *old_item,
                new: *new_item,
                dirty: is_dirty(old_item, new_item),
            }),
            None => added.push((key.clone(), *new_item)),
        }
    }

    let deleted = old_map
        .into_iter()
        .filter(|(key, _)| !new_map.contains_key(key))
        .collect();

    Ok(LayerDiff {
        same,
        added,
        deleted,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn kv(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn run<'a>(
        old: &'a [(String, String)],
        new: &'a [(String, String)],
    ) -> Result<LayerDiff<'a, (String, String), (String, String)>, DiffError> {
        diff_layer(
            Layer::Attribute,
            old,
            new,
            |o| o.0.clone(),
            |n| n.0.clone(),
            |o, n| o.1 != n.1,
        )
    }

    #[test]
    fn partitions_keys() {
        let old = kv(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let new = kv(&[("b", "2"), ("c", "9"), ("d", "4")]);
        let diff = run(&old, &new).unwrap();

        assert_eq!(diff.same_keys().collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(diff.added_keys().collect::<Vec<_>>(), vec!["d"]);
        assert_eq!(diff.deleted_keys().collect::<Vec<_>>(), vec!["a"]);
        assert!(!diff.same[0].dirty);
        assert!(diff.same[1].dirty);
        assert_eq!(diff.dirty_count(), 1);
    }

    #[test]
    fn partition_is_complete_and_disjoint() {
        let old = kv(&[("a", "1"), ("b", "2"), ("x", "0")]);
        let new = kv(&[("b", "2"), ("y", "1"), ("a", "5"), ("z", "3")]);
        let diff = run(&old, &new).unwrap();

        let same: HashSet<&str> = diff.same_keys().collect();
        let added: HashSet<&str> = diff.added_keys().collect();
        let deleted: HashSet<&str> = diff.deleted_keys().collect();
        assert!(same.is_disjoint(&added));
        assert!(same.is_disjoint(&deleted));
        assert!(added.is_disjoint(&deleted));

        let union: HashSet<&str> = same.iter().chain(&added).chain(&deleted).copied().collect();
        let all: HashSet<&str> = old.iter().chain(&new).map(|(k, _)| k.as_str()).collect();
        assert_eq!(union, all);
    }

    #[test]
    fn identical_lists_are_clean() {
        let old = kv(&[("a", "1"), ("b", "2")]);
        let diff = run(&old, &old).unwrap();
        assert!(diff.is_clean());
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let old = kv(&[]);
        let new = kv(&[("a", "1"), ("a", "2")]);
        let err = run(&old, &new).unwrap_err();
        assert_eq!(
            err,
            DiffError::DuplicateKey {
                layer: Layer::Attribute,
                side: Side::New,
                key: "a".into()
            }
        );
    }

    #[test]
    fn empty_identity_is_rejected() {
        let old = kv(&[("a", "1"), ("", "2")]);
        let new = kv(&[]);
        let err = run(&old, &new).unwrap_err();
        assert!(matches!(
            err,
            DiffError::MissingIdentity {
                side: Side::Old,
                position: 1,
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            "attribute at position 1 of the old list has an empty identity"
        );
    }
}
