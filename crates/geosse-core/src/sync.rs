//! Applying stream events to a feature collection.
//!
//! | Event    | Effect                                                        |
//! |----------|---------------------------------------------------------------|
//! | `create` | add the feature, no de-duplication                            |
//! | `update` | remove every feature sharing the key, then add the new one once |
//! | `delete` | remove every feature sharing the key                          |
//! | others   | nothing                                                       |
//!
//! An update that matches nothing is dropped rather than turned into an
//! insert. Drops and payloads without a usable key leave the collection
//! untouched but are reported through [`ApplyOutcome`] and logged.

use geosse_types::{DecodeError, EventKind, Feature, FeatureKey, LayerId, SseEvent, StreamEvent};
use tracing::{debug, warn};

use crate::collection::FeatureCollection;

/// Errors raised while turning stream traffic into collection changes.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The event payload is not a valid feature.
    #[error("event payload rejected: {source}")]
    Decode {
        /// The underlying decode error.
        #[from]
        source: DecodeError,
    },

    /// Layer or subscription options are unusable.
    #[error("invalid options: {message}")]
    InvalidOptions {
        /// What is wrong with the options.
        message: String,
    },
}

/// What applying one event did to the collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// A `create` stored the feature.
    Added {
        /// Reference of the new feature.
        layer: LayerId,
    },
    /// An `update` removed the matching features and stored the new one.
    Replaced {
        /// References that were removed (more than one means the key
        /// was not unique).
        removed: Vec<LayerId>,
        /// Reference of the replacement.
        added: LayerId,
    },
    /// An `update` matched no stored feature and was discarded.
    UpdateDropped {
        /// The key that matched nothing.
        key: FeatureKey,
    },
    /// A `delete` removed the matching features (possibly none).
    Deleted {
        /// References that were removed.
        removed: Vec<LayerId>,
    },
    /// An `update` or `delete` payload carried no usable identity key.
    MissingKey {
        /// The event that was skipped.
        kind: EventKind,
    },
    /// The event does not touch the collection.
    Ignored,
}

impl ApplyOutcome {
    /// Whether the collection changed.
    pub fn changed(&self) -> bool {
        match self {
            Self::Added { .. } | Self::Replaced { .. } => true,
            Self::Deleted { removed } => !removed.is_empty(),
            Self::UpdateDropped { .. } | Self::MissingKey { .. } | Self::Ignored => false,
        }
    }
}

/// Applies stream events to a collection, correlating on one property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSync {
    id_field: String,
}

impl FeatureSync {
    /// Correlate features on the `id_field` property.
    pub fn new(id_field: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
        }
    }

    /// The identity-key property name.
    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    /// Decode a wire event and apply it.
    ///
    /// Unknown event names are [`ApplyOutcome::Ignored`].
    pub fn apply_sse<C>(&self, collection: &mut C, event: &SseEvent) -> Result<ApplyOutcome, SyncError>
    where
        C: FeatureCollection + ?Sized,
    {
        match StreamEvent::from_sse(event)? {
            Some(decoded) => Ok(self.apply(collection, decoded)),
            None => {
                debug!(event = event.event, "ignoring unsubscribed event");
                Ok(ApplyOutcome::Ignored)
            }
        }
    }

    /// Apply a decoded event.
    pub fn apply<C>(&self, collection: &mut C, event: StreamEvent) -> ApplyOutcome
    where
        C: FeatureCollection + ?Sized,
    {
        match event {
            StreamEvent::Create(feature) => {
                let layer = collection.add_feature(feature);
                debug!(layer = %layer, "feature created");
                ApplyOutcome::Added { layer }
            }
            StreamEvent::Update(feature) => self.update(collection, feature),
            StreamEvent::Delete(feature) => self.delete(collection, &feature),
            StreamEvent::Message(_) | StreamEvent::Open | StreamEvent::Error => {
                ApplyOutcome::Ignored
            }
        }
    }

    fn update<C>(&self, collection: &mut C, feature: Feature) -> ApplyOutcome
    where
        C: FeatureCollection + ?Sized,
    {
        let Some(key) = feature.key(&self.id_field) else {
            warn!(field = self.id_field, "update payload has no identity key, skipping");
            return ApplyOutcome::MissingKey {
                kind: EventKind::Update,
            };
        };

        let matches = collection.find_by_key(&self.id_field, &key);
        if matches.is_empty() {
            warn!(field = self.id_field, key = %key, "update matched no stored feature, dropping");
            return ApplyOutcome::UpdateDropped { key };
        }
        if matches.len() > 1 {
            warn!(
                field = self.id_field,
                key = %key,
                matches = matches.len(),
                "identity key is not unique, replacing all matches"
            );
        }

        let removed = remove_all(collection, matches);
        let added = collection.add_feature(feature);
        debug!(key = %key, added = %added, removed = removed.len(), "feature replaced");
        ApplyOutcome::Replaced { removed, added }
    }

    fn delete<C>(&self, collection: &mut C, feature: &Feature) -> ApplyOutcome
    where
        C: FeatureCollection + ?Sized,
    {
        let Some(key) = feature.key(&self.id_field) else {
            warn!(field = self.id_field, "delete payload has no identity key, skipping");
            return ApplyOutcome::MissingKey {
                kind: EventKind::Delete,
            };
        };

        let matches = collection.find_by_key(&self.id_field, &key);
        let removed = remove_all(collection, matches);
        debug!(key = %key, removed = removed.len(), "feature deleted");
        ApplyOutcome::Deleted { removed }
    }
}

fn remove_all<C>(collection: &mut C, layers: Vec<LayerId>) -> Vec<LayerId>
where
    C: FeatureCollection + ?Sized,
{
    layers
        .into_iter()
        .filter(|layer| collection.remove_feature(*layer).is_some())
        .collect()
}

#[cfg(test)]
mod tests {
    use geosse_types::Geometry;
    use serde_json::json;

    use super::*;
    use crate::collection::FeatureLayer;

    fn point(id: &str, x: f64) -> Feature {
        Feature::new(Some(Geometry::Point {
            coordinates: vec![x, 0.0],
        }))
        .with_property("id", id)
    }

    fn keys(layer: &FeatureLayer) -> Vec<Option<FeatureKey>> {
        layer.iter().map(|(_, f)| f.key("id")).collect()
    }

    #[test]
    fn create_adds_exactly_one() {
        let sync = FeatureSync::new("id");
        let mut layer = FeatureLayer::new().with_features([point("x", 0.0)]);

        let outcome = sync.apply(&mut layer, StreamEvent::Create(point("a1", 1.0)));
        assert!(matches!(outcome, ApplyOutcome::Added { .. }));
        assert_eq!(layer.len(), 2);
        assert_eq!(layer.find_by_key("id", &FeatureKey::from("a1")).len(), 1);
    }

    #[test]
    fn create_twice_duplicates() {
        let sync = FeatureSync::new("id");
        let mut layer = FeatureLayer::new();
        sync.apply(&mut layer, StreamEvent::Create(point("a1", 1.0)));
        sync.apply(&mut layer, StreamEvent::Create(point("a1", 1.0)));
        assert_eq!(layer.len(), 2);
        assert_eq!(layer.duplicate_keys("id").len(), 1);
    }

    #[test]
    fn update_replaces_matching_feature() {
        let sync = FeatureSync::new("id");
        let mut layer = FeatureLayer::new().with_features([point("a1", 1.0), point("b2", 2.0)]);
        let old = layer.find_by_key("id", &FeatureKey::from("a1"));

        let outcome = sync.apply(&mut layer, StreamEvent::Update(point("a1", 9.0)));
        let (removed, added) = match outcome {
            ApplyOutcome::Replaced { removed, added } => (removed, Some(added)),
            _ => (Vec::new(), None),
        };
        assert_eq!(removed, old);
        assert_eq!(layer.len(), 2);
        assert_eq!(
            added
                .and_then(|layer_id| layer.feature(layer_id))
                .and_then(|f| f.geometry.clone()),
            Some(Geometry::Point {
                coordinates: vec![9.0, 0.0]
            })
        );
    }

    #[test]
    fn update_with_duplicates_removes_all_and_adds_once() {
        let sync = FeatureSync::new("id");
        let mut layer =
            FeatureLayer::new().with_features([point("a1", 1.0), point("a1", 2.0), point("c", 3.0)]);

        let outcome = sync.apply(&mut layer, StreamEvent::Update(point("a1", 5.0)));
        assert!(matches!(outcome, ApplyOutcome::Replaced { ref removed, .. } if removed.len() == 2));
        // size changes by 1 - N with N = 2
        assert_eq!(layer.len(), 2);
        assert_eq!(layer.find_by_key("id", &FeatureKey::from("a1")).len(), 1);
    }

    #[test]
    fn update_without_match_is_dropped() {
        let sync = FeatureSync::new("id");
        let mut layer = FeatureLayer::new().with_features([point("a1", 1.0)]);

        let outcome = sync.apply(&mut layer, StreamEvent::Update(point("zz", 1.0)));
        assert_eq!(
            outcome,
            ApplyOutcome::UpdateDropped {
                key: FeatureKey::from("zz")
            }
        );
        assert!(!outcome.changed());
        assert_eq!(keys(&layer), vec![Some(FeatureKey::from("a1"))]);
    }

    #[test]
    fn update_does_not_match_stored_features_lacking_the_field() {
        let sync = FeatureSync::new("id");
        let stored = Feature::default().with_property("name", "depot");
        let mut layer = FeatureLayer::new().with_features([stored]);

        let outcome = sync.apply(&mut layer, StreamEvent::Update(point("a1", 1.0)));
        assert!(matches!(outcome, ApplyOutcome::UpdateDropped { .. }));
        assert_eq!(layer.len(), 1);
    }

    #[test]
    fn payload_without_key_is_reported() {
        let sync = FeatureSync::new("id");
        let mut layer = FeatureLayer::new().with_features([Feature::default()]);

        let keyless = Feature::default().with_property("name", "x");
        assert_eq!(
            sync.apply(&mut layer, StreamEvent::Update(keyless.clone())),
            ApplyOutcome::MissingKey {
                kind: EventKind::Update
            }
        );
        assert_eq!(
            sync.apply(&mut layer, StreamEvent::Delete(keyless)),
            ApplyOutcome::MissingKey {
                kind: EventKind::Delete
            }
        );
        assert_eq!(layer.len(), 1);
    }

    #[test]
    fn delete_removes_every_match() {
        let sync = FeatureSync::new("id");
        let mut layer =
            FeatureLayer::new().with_features([point("a1", 1.0), point("b", 2.0), point("a1", 3.0)]);

        let outcome = sync.apply(&mut layer, StreamEvent::Delete(point("a1", 0.0)));
        assert!(matches!(outcome, ApplyOutcome::Deleted { ref removed } if removed.len() == 2));
        assert_eq!(keys(&layer), vec![Some(FeatureKey::from("b"))]);
    }

    #[test]
    fn delete_twice_is_a_noop_the_second_time() {
        let sync = FeatureSync::new("id");
        let mut layer = FeatureLayer::new().with_features([point("a1", 1.0)]);

        let first = sync.apply(&mut layer, StreamEvent::Delete(point("a1", 0.0)));
        let second = sync.apply(&mut layer, StreamEvent::Delete(point("a1", 0.0)));
        assert!(first.changed());
        assert_eq!(second, ApplyOutcome::Deleted { removed: Vec::new() });
        assert!(layer.is_empty());
    }

    #[test]
    fn numeric_and_string_keys_do_not_cross_match() {
        let sync = FeatureSync::new("id");
        let stored = Feature::default().with_property("id", 1);
        let mut layer = FeatureLayer::new().with_features([stored]);

        let outcome = sync.apply(
            &mut layer,
            StreamEvent::Delete(Feature::default().with_property("id", "1")),
        );
        assert_eq!(outcome, ApplyOutcome::Deleted { removed: Vec::new() });

        let outcome = sync.apply(
            &mut layer,
            StreamEvent::Delete(Feature::default().with_property("id", json!(1.0))),
        );
        assert!(outcome.changed());
    }

    #[test]
    fn lifecycle_events_are_ignored() {
        let sync = FeatureSync::new("id");
        let mut layer = FeatureLayer::new();
        for event in [
            StreamEvent::Open,
            StreamEvent::Error,
            StreamEvent::Message("ping".to_owned()),
        ] {
            assert_eq!(sync.apply(&mut layer, event), ApplyOutcome::Ignored);
        }
        assert!(layer.is_empty());
    }

    #[test]
    fn wire_events_roundtrip_through_the_layer() {
        let sync = FeatureSync::new("id");
        let mut layer = FeatureLayer::indexed_on("id");

        let create = SseEvent::new(
            "create",
            r#"{"type":"Feature","properties":{"id":"a1"},"geometry":{"type":"Point","coordinates":[1,1]}}"#,
        );
        let update = SseEvent::new(
            "update",
            r#"{"type":"Feature","properties":{"id":"a1"},"geometry":{"type":"Point","coordinates":[2,2]}}"#,
        );
        let delete = SseEvent::new("delete", r#"{"properties":{"id":"a1"}}"#);

        assert!(sync.apply_sse(&mut layer, &create).is_ok());
        assert_eq!(layer.len(), 1);

        assert!(sync.apply_sse(&mut layer, &update).is_ok());
        assert_eq!(layer.len(), 1);
        let geometry = layer.iter().next().and_then(|(_, f)| f.geometry.clone());
        assert_eq!(
            geometry,
            Some(Geometry::Point {
                coordinates: vec![2.0, 2.0]
            })
        );

        assert!(sync.apply_sse(&mut layer, &delete).is_ok());
        assert!(layer.is_empty());
    }

    #[test]
    fn malformed_payload_changes_nothing() {
        let sync = FeatureSync::new("id");
        let mut layer = FeatureLayer::new();
        let result = sync.apply_sse(&mut layer, &SseEvent::new("create", "{\"properties\":"));
        assert!(matches!(result, Err(SyncError::Decode { .. })));
        assert!(layer.is_empty());
    }

    #[test]
    fn unknown_wire_events_are_ignored() {
        let sync = FeatureSync::new("id");
        let mut layer = FeatureLayer::new();
        let result = sync.apply_sse(&mut layer, &SseEvent::new("heartbeat", "{}"));
        assert!(matches!(result, Ok(ApplyOutcome::Ignored)));
    }
}
