//! The feature collection seam and its in-memory implementation.
//!
//! The sync layer never owns features itself. It reaches the surrounding
//! map layer through [`FeatureCollection`]: add, remove, enumerate, read.
//! [`FeatureLayer`] is the in-memory collection used by the client and in
//! tests. It can maintain an index on one property so identity lookups
//! skip the linear scan.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use geosse_types::{Feature, FeatureKey, LayerId};
use tracing::warn;

/// A mutable collection of features addressed by [`LayerId`].
///
/// Implementations assign a fresh [`LayerId`] on every insert. The sync
/// layer assumes it is the only writer while a subscription is active.
pub trait FeatureCollection {
    /// Store a feature and return its reference.
    fn add_feature(&mut self, feature: Feature) -> LayerId;

    /// Remove a stored feature. Returns `None` if the reference is unknown.
    fn remove_feature(&mut self, layer: LayerId) -> Option<Feature>;

    /// References to every stored feature.
    fn list_features(&self) -> Vec<LayerId>;

    /// Read a stored feature.
    fn feature(&self, layer: LayerId) -> Option<&Feature>;

    /// Number of stored features.
    fn len(&self) -> usize {
        self.list_features().len()
    }

    /// Whether the collection is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// References to every feature whose `field` property equals `key`.
    ///
    /// The default is a linear scan over [`list_features`].
    ///
    /// [`list_features`]: FeatureCollection::list_features
    fn find_by_key(&self, field: &str, key: &FeatureKey) -> Vec<LayerId> {
        self.list_features()
            .into_iter()
            .filter(|layer| {
                self.feature(*layer)
                    .and_then(|f| f.key(field))
                    .is_some_and(|k| &k == key)
            })
            .collect()
    }
}

/// Identity-key index over one property name.
#[derive(Debug, Clone)]
struct KeyIndex {
    field: String,
    entries: HashMap<FeatureKey, BTreeSet<LayerId>>,
}

impl KeyIndex {
    fn new(field: String) -> Self {
        Self {
            field,
            entries: HashMap::new(),
        }
    }

    /// Record `layer` under its key. Returns how many layers already held
    /// that key.
    fn insert(&mut self, layer: LayerId, feature: &Feature) -> usize {
        let Some(key) = feature.key(&self.field) else {
            return 0;
        };
        let slot = self.entries.entry(key).or_default();
        let existing = slot.len();
        slot.insert(layer);
        existing
    }

    fn remove(&mut self, layer: LayerId, feature: &Feature) {
        let Some(key) = feature.key(&self.field) else {
            return;
        };
        if let Some(slot) = self.entries.get_mut(&key) {
            slot.remove(&layer);
            if slot.is_empty() {
                self.entries.remove(&key);
            }
        }
    }
}

/// In-memory, insertion-ordered feature collection.
#[derive(Debug, Clone, Default)]
pub struct FeatureLayer {
    features: BTreeMap<LayerId, Feature>,
    next_id: u64,
    index: Option<KeyIndex>,
}

impl FeatureLayer {
    /// Create an empty, unindexed layer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty layer indexed on `field`.
    ///
    /// Lookups on that field through [`FeatureCollection::find_by_key`]
    /// become hash lookups, and inserting a second feature with an
    /// already-present key logs a warning.
    pub fn indexed_on(field: impl Into<String>) -> Self {
        Self {
            index: Some(KeyIndex::new(field.into())),
            ..Self::default()
        }
    }

    /// Add every feature from `features`, in order.
    #[must_use]
    pub fn with_features(mut self, features: impl IntoIterator<Item = Feature>) -> Self {
        for feature in features {
            self.add_feature(feature);
        }
        self
    }

    /// The indexed property name, if any.
    pub fn indexed_field(&self) -> Option<&str> {
        self.index.as_ref().map(|i| i.field.as_str())
    }

    /// Iterate stored features in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (LayerId, &Feature)> {
        self.features.iter().map(|(id, f)| (*id, f))
    }

    /// Every key under `field` held by more than one stored feature.
    ///
    /// The sync rules assume keys are unique; a non-empty result means
    /// updates and deletes on those keys touch several features at once.
    pub fn duplicate_keys(&self, field: &str) -> Vec<(FeatureKey, Vec<LayerId>)> {
        let mut seen: Vec<(FeatureKey, Vec<LayerId>)> = Vec::new();
        for (layer, feature) in self.iter() {
            let Some(key) = feature.key(field) else {
                continue;
            };
            match seen.iter_mut().find(|(k, _)| *k == key) {
                Some((_, layers)) => layers.push(layer),
                None => seen.push((key, vec![layer])),
            }
        }
        seen.retain(|(_, layers)| layers.len() > 1);
        seen
    }
}

impl FeatureCollection for FeatureLayer {
    fn add_feature(&mut self, feature: Feature) -> LayerId {
        let layer = LayerId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);

        if let Some(index) = self.index.as_mut() {
            let existing = index.insert(layer, &feature);
            if existing > 0 {
                warn!(
                    field = index.field,
                    layer = %layer,
                    existing,
                    "identity key already present in layer"
                );
            }
        }

        self.features.insert(layer, feature);
        layer
    }

    fn remove_feature(&mut self, layer: LayerId) -> Option<Feature> {
        let feature = self.features.remove(&layer)?;
        if let Some(index) = self.index.as_mut() {
            index.remove(layer, &feature);
        }
        Some(feature)
    }

    fn list_features(&self) -> Vec<LayerId> {
        self.features.keys().copied().collect()
    }

    fn feature(&self, layer: LayerId) -> Option<&Feature> {
        self.features.get(&layer)
    }

    fn len(&self) -> usize {
        self.features.len()
    }

    fn find_by_key(&self, field: &str, key: &FeatureKey) -> Vec<LayerId> {
        match self.index.as_ref() {
            Some(index) if index.field == field => index
                .entries
                .get(key)
                .map(|layers| layers.iter().copied().collect())
                .unwrap_or_default(),
            _ => self
                .iter()
                .filter(|(_, f)| f.key(field).is_some_and(|k| &k == key))
                .map(|(layer, _)| layer)
                .collect(),
        }
    }
}
