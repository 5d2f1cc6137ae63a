use super::GarmentRef;
use crate::catalog::default_wardrobe;

/// Garments the user can pick from. Starts as the default catalog and only
/// grows, one entry per distinct garment id.
#[derive(Debug, Clone, PartialEq)]
pub struct Wardrobe {
    items: Vec<GarmentRef>,
}

impl Default for Wardrobe {
    fn default() -> Self {
        Self {
            items: default_wardrobe(),
        }
    }
}

impl Wardrobe {
    pub fn items(&self) -> &[GarmentRef] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&GarmentRef> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Returns `false` when a garment with the same id is already present.
    pub fn insert_if_new(&mut self, garment: GarmentRef) -> bool {
        if self.contains(&garment.id) {
            return false;
        }
        self.items.push(garment);
        true
    }
}
