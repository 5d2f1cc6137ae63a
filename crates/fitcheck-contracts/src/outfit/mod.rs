mod garment;
mod history;
mod wardrobe;

pub use garment::GarmentRef;
pub use history::{OutfitHistory, OutfitLayer};
pub use wardrobe::Wardrobe;
