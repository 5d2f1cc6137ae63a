mod backgrounds;
mod poses;
mod video_templates;
mod wardrobe;

pub use backgrounds::{BackgroundPreset, BACKGROUND_PRESETS};
pub use poses::{pose_index, pose_label, POSE_INSTRUCTIONS};
pub use video_templates::{
    template_by_id, template_or_default, MotionStrength, VideoTemplate, DEFAULT_VIDEO_TEMPLATE_ID,
    VIDEO_TEMPLATES,
};
pub use wardrobe::default_wardrobe;
