#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionStrength {
    Low,
    Medium,
    High,
}

impl MotionStrength {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// A movement preset for reel generation. The backend owns the actual
/// motion prompt; the client only sends `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub music_style: &'static str,
    pub duration_s: u32,
    pub motion_strength: MotionStrength,
    pub icon: &'static str,
}

pub const DEFAULT_VIDEO_TEMPLATE_ID: &str = "runway-walk";

pub const VIDEO_TEMPLATES: &[VideoTemplate] = &[
    VideoTemplate {
        id: "runway-walk",
        name: "Runway Walk",
        description: "Classic runway walk towards camera",
        music_style: "Deep House / Fashion Week",
        duration_s: 8,
        motion_strength: MotionStrength::Medium,
        icon: "👠",
    },
    VideoTemplate {
        id: "spin-showcase",
        name: "360° Spin",
        description: "Elegant turn to showcase the outfit",
        music_style: "Ambient Pop / Sophisticated",
        duration_s: 8,
        motion_strength: MotionStrength::Medium,
        icon: "🔄",
    },
    VideoTemplate {
        id: "pose-transition",
        name: "Pose Flow",
        description: "Smooth transitions between fashion poses",
        music_style: "Electronic Pop / Upbeat",
        duration_s: 10,
        motion_strength: MotionStrength::High,
        icon: "✨",
    },
    VideoTemplate {
        id: "close-detail",
        name: "Detail Focus",
        description: "Close-up of clothing details and accessories",
        music_style: "Minimalist Electronica / Luxury",
        duration_s: 8,
        motion_strength: MotionStrength::Low,
        icon: "🔍",
    },
    VideoTemplate {
        id: "lifestyle-walk",
        name: "Lifestyle Walk",
        description: "Natural everyday style movement",
        music_style: "Indie Pop / Feel-Good",
        duration_s: 10,
        motion_strength: MotionStrength::Medium,
        icon: "🚶‍♀️",
    },
    VideoTemplate {
        id: "dramatic-entrance",
        name: "Dramatic Entry",
        description: "Bold entrance with dynamic movement",
        music_style: "Cinematic Pop / Dramatic",
        duration_s: 8,
        motion_strength: MotionStrength::High,
        icon: "⚡",
    },
];

pub fn template_by_id(id: &str) -> Option<&'static VideoTemplate> {
    VIDEO_TEMPLATES.iter().find(|template| template.id == id)
}

/// Unknown or missing ids fall back to the first template.
pub fn template_or_default(id: Option<&str>) -> &'static VideoTemplate {
    id.and_then(template_by_id).unwrap_or(&VIDEO_TEMPLATES[0])
}
