use crate::outfit::GarmentRef;

const CATALOG: &[(&str, &str, &str, &str, &str)] = &[
    (
        "gemini-sweat",
        "Gemini LS Tee",
        "https://raw.githubusercontent.com/ammaarreshi/app-images/refs/heads/main/gemini-sweat-2.png",
        "Top",
        "Black",
    ),
    (
        "gemini-tee",
        "Gemini Tee",
        "https://raw.githubusercontent.com/ammaarreshi/app-images/refs/heads/main/Gemini-tee.png",
        "Top",
        "Black",
    ),
    (
        "tech-jacket",
        "Tech Jacket",
        "https://storage.googleapis.com/gemini-95-icons/vto-wardrobe/black-jacket.png",
        "Outerwear",
        "Black",
    ),
    (
        "denim-jeans",
        "Denim Jeans",
        "https://storage.googleapis.com/gemini-95-icons/vto-wardrobe/denim-jeans.png",
        "Bottom",
        "Blue",
    ),
    (
        "grey-dress",
        "Grey Dress",
        "https://raw.githubusercontent.com/bibliotekaglazury-jpg/Fit-Check/main/grey%20elegant%20dress.png",
        "Dress",
        "Grey",
    ),
    (
        "brown-jacket",
        "Brown Jacket",
        "https://raw.githubusercontent.com/bibliotekaglazury-jpg/Fit-Check/main/brown%20jacket.png",
        "Outerwear",
        "Brown",
    ),
    (
        "trench-coat",
        "Trench Coat",
        "https://storage.googleapis.com/gemini-95-icons/vto-wardrobe/trench-coat.png",
        "Outerwear",
        "Beige",
    ),
    (
        "fauna-dress",
        "Fauna Dress",
        "https://raw.githubusercontent.com/bibliotekaglazury-jpg/Fit-Check/d9082ea500e346f5e597aedf8254049694290da0/FAUNA%20dress.png",
        "Dress",
        "Green",
    ),
];

/// The fixed starting wardrobe. A session's wardrobe grows from this list.
pub fn default_wardrobe() -> Vec<GarmentRef> {
    CATALOG
        .iter()
        .map(|(id, name, url, category, color)| {
            GarmentRef::new(*id, *name, *url)
                .with_category(*category)
                .with_color(*color)
        })
        .collect()
}
