//! The per-run work set.

use std::collections::BTreeMap;

use ndvimap_cloud::Scene;
use ndvimap_core::Boundary;

/// One field paired with the scene selected for it.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub field_id: i64,
    pub scene: Scene,
    pub boundary: Boundary,
}

/// Work items keyed by field id, plus the distinct scenes they need.
#[derive(Debug, Default)]
pub struct WorkSet {
    items: BTreeMap<i64, WorkItem>,
    scenes: BTreeMap<String, Scene>,
}

impl WorkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the scene chosen for a field.
    ///
    /// A scene shared by several fields is kept once in the download set.
    pub fn insert(&mut self, item: WorkItem) {
        self.scenes
            .entry(item.scene.scene_id.clone())
            .or_insert_with(|| item.scene.clone());
        self.items.insert(item.field_id, item);
    }

    pub fn items(&self) -> impl Iterator<Item = &WorkItem> {
        self.items.values()
    }

    /// Distinct scenes to download, ordered by scene id.
    pub fn download_set(&self) -> Vec<Scene> {
        self.scenes.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
