#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackgroundPreset {
    pub id: &'static str,
    pub name: &'static str,
    pub url: &'static str,
}

/// Example scenes offered next to the free-text prompt box.
pub const BACKGROUND_PRESETS: &[BackgroundPreset] = &[
    BackgroundPreset {
        id: "city-street",
        name: "City Street",
        url: "https://storage.googleapis.com/gemini-95-icons/vto-backgrounds/city-street.jpg",
    },
    BackgroundPreset {
        id: "beach",
        name: "Beach",
        url: "https://storage.googleapis.com/gemini-95-icons/vto-backgrounds/beach.jpg",
    },
    BackgroundPreset {
        id: "cafe",
        name: "Cafe",
        url: "https://storage.googleapis.com/gemini-95-icons/vto-backgrounds/cafe.jpg",
    },
    BackgroundPreset {
        id: "park",
        name: "Park",
        url: "https://storage.googleapis.com/gemini-95-icons/vto-backgrounds/park.jpg",
    },
    BackgroundPreset {
        id: "studio",
        name: "Studio",
        url: "https://storage.googleapis.com/gemini-95-icons/vto-backgrounds/studio.jpg",
    },
];
