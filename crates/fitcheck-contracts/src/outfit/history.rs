use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::GarmentRef;

/// One rung of the outfit stack: the garment applied at this step plus every
/// pose rendered for it so far. Pose entries keep insertion order, so the
/// first entry is always the image the layer was created with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutfitLayer {
    pub garment: Option<GarmentRef>,
    pose_images: IndexMap<String, String>,
}

impl OutfitLayer {
    /// The untouched model, before any garment.
    pub fn base(pose_label: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self::from_parts(None, pose_label.into(), image_url.into())
    }

    pub fn with_garment(
        garment: GarmentRef,
        pose_label: impl Into<String>,
        image_url: impl Into<String>,
    ) -> Self {
        Self::from_parts(Some(garment), pose_label.into(), image_url.into())
    }

    fn from_parts(garment: Option<GarmentRef>, pose_label: String, image_url: String) -> Self {
        let mut pose_images = IndexMap::new();
        pose_images.insert(pose_label, image_url);
        Self {
            garment,
            pose_images,
        }
    }

    pub fn garment_id(&self) -> Option<&str> {
        self.garment.as_ref().map(|garment| garment.id.as_str())
    }

    pub fn pose_image(&self, pose_label: &str) -> Option<&str> {
        self.pose_images.get(pose_label).map(String::as_str)
    }

    pub fn any_pose_image(&self) -> Option<&str> {
        self.pose_images.values().next().map(String::as_str)
    }

    pub fn pose_labels(&self) -> Vec<&str> {
        self.pose_images.keys().map(String::as_str).collect()
    }

    pub fn pose_count(&self) -> usize {
        self.pose_images.len()
    }

    fn insert_pose(&mut self, pose_label: &str, image_url: &str) -> bool {
        if self.pose_images.contains_key(pose_label) {
            return false;
        }
        self.pose_images
            .insert(pose_label.to_string(), image_url.to_string());
        true
    }
}

/// Ordered outfit layers, index 0 being the base model. Layer `i` was made by
/// dressing a pose image of layer `i - 1`.
///
/// Branching is destructive: appending from the middle first drops every
/// layer after the branch point.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OutfitHistory {
    layers: Vec<OutfitLayer>,
}

impl OutfitHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(pose_label: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            layers: vec![OutfitLayer::base(pose_label, image_url)],
        }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[OutfitLayer] {
        &self.layers
    }

    pub fn layer_at(&self, index: usize) -> Option<&OutfitLayer> {
        self.layers.get(index)
    }

    pub fn append(&mut self, layer: OutfitLayer) {
        self.layers.push(layer);
    }

    /// Drops every layer positioned after `index`.
    pub fn truncate_after(&mut self, index: usize) {
        self.layers.truncate(index.saturating_add(1));
    }

    /// Truncates after `index`, appends `layer` and returns its position.
    pub fn branch_from(&mut self, index: usize, layer: OutfitLayer) -> usize {
        self.truncate_after(index);
        self.append(layer);
        self.layers.len() - 1
    }

    /// Adds a pose to an existing layer. Out-of-range indices and labels that
    /// are already cached are ignored; returns whether anything was added.
    pub fn record_pose(&mut self, layer_index: usize, pose_label: &str, image_url: &str) -> bool {
        match self.layers.get_mut(layer_index) {
            Some(layer) => layer.insert_pose(pose_label, image_url),
            None => false,
        }
    }

    /// Layers from the base up to and including `upto`.
    pub fn active_slice(&self, upto: usize) -> &[OutfitLayer] {
        let end = upto.saturating_add(1).min(self.layers.len());
        &self.layers[..end]
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
