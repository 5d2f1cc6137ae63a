use serde::{Deserialize, Serialize};

/// A wearable item. `id` identifies the garment across the whole session;
/// two refs with the same id are the same garment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GarmentRef {
    pub id: String,
    pub name: String,
    /// Remote URL for catalog items, local path for uploads.
    pub source: String,
    pub category: Option<String>,
    pub color: Option<String>,
}

impl GarmentRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            source: source.into(),
            category: None,
            color: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}
