use chrono::{DateTime, Utc};
use fitcheck_contracts::outfit::{OutfitHistory, Wardrobe};

use crate::errors::FailureKind;
use crate::upload::UploadFile;
use crate::video::VideoHandle;

/// Where the in-flight work shows up. Only one operation runs at a time
/// regardless of context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadingContext {
    Canvas,
    PostCopy,
    Carousel,
}

impl LoadingContext {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Canvas => "canvas",
            Self::PostCopy => "post-copy",
            Self::Carousel => "carousel",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadingState {
    pub context: LoadingContext,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CarouselProgress {
    pub current: usize,
    pub total: usize,
    pub stage: String,
}

#[derive(Debug)]
pub struct ActiveVideo {
    pub handle: VideoHandle,
    /// History entry this video was opened from.
    pub source_id: String,
}

#[derive(Debug)]
pub struct VideoHistoryItem {
    pub id: String,
    pub handle: VideoHandle,
    pub template_id: String,
    pub template_name: String,
    pub template_icon: String,
    pub created_at: DateTime<Utc>,
}

/// What a session operation did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Guard rejected the call; nothing changed.
    Skipped,
    Applied,
    Failed { kind: FailureKind, message: String },
    /// The session was reset while the work was in flight.
    Discarded,
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Everything the try-on session knows. Read it through
/// `TryOnSession::inspect`; only session operations mutate it.
#[derive(Debug)]
pub struct SessionState {
    pub model_image: Option<String>,
    pub history: OutfitHistory,
    pub current_outfit_index: usize,
    pub current_pose_index: usize,
    pub loading: Option<LoadingState>,
    pub error: Option<String>,
    pub wardrobe: Wardrobe,
    pub background_id: Option<String>,
    pub background_image: Option<String>,
    pub uploaded_background: Option<UploadFile>,
    pub gallery_selection: Option<String>,
    pub prompt_history: Vec<String>,
    pub post_copy: Option<String>,
    pub brand_name: String,
    pub generation_history: Vec<String>,
    pub active_video: Option<ActiveVideo>,
    pub video_history: Vec<VideoHistoryItem>,
    pub carousel_images: Vec<String>,
    pub carousel_progress: Option<CarouselProgress>,
    pub(crate) epoch: u64,
    /// Bumped by each accepted carousel so older progress clears skip.
    pub(crate) carousel_run: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            model_image: None,
            history: OutfitHistory::new(),
            current_outfit_index: 0,
            current_pose_index: 0,
            loading: None,
            error: None,
            wardrobe: Wardrobe::default(),
            background_id: None,
            background_image: None,
            uploaded_background: None,
            gallery_selection: None,
            prompt_history: Vec::new(),
            post_copy: None,
            brand_name: String::new(),
            generation_history: Vec::new(),
            active_video: None,
            video_history: Vec::new(),
            carousel_images: Vec::new(),
            carousel_progress: None,
            epoch: 0,
            carousel_run: 0,
        }
    }
}

impl SessionState {
    pub fn is_loading(&self) -> bool {
        self.loading.is_some()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn clear_background(&mut self) {
        self.background_id = None;
        self.background_image = None;
        self.uploaded_background = None;
    }

    /// Most recent first, unique, at most `cap` entries.
    pub(crate) fn remember_prompt(&mut self, prompt: &str, cap: usize) {
        self.prompt_history.retain(|existing| existing != prompt);
        self.prompt_history.insert(0, prompt.to_string());
        self.prompt_history.truncate(cap);
    }

    pub(crate) fn video_history_index(&self, id: &str) -> Option<usize> {
        self.video_history.iter().position(|item| item.id == id)
    }
}
