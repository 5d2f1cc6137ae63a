//! Capability surface of the external generation service.
//!
//! Images travel as URL strings: `https://` locations from the backend or
//! `data:` URLs from the dryrun gateway. Every capability blocks the calling
//! thread and may fail.

mod dryrun;
mod http;

use anyhow::Result;

use crate::upload::UploadFile;

pub use dryrun::{swatch_upload, DryrunGateway};
pub use http::HttpGateway;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostCopyRequest {
    pub image: String,
    pub outfit_description: String,
    pub scene_description: String,
    pub brand_name: Option<String>,
}

/// Terminal state of a finished video job. Exactly one applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoJobOutcome {
    Ready { uri: String },
    Failed { message: String },
    Blocked { reason: String, message: String },
    /// Finished without result or error, usually a safety filter.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoJob {
    pub id: String,
    pub done: bool,
    pub outcome: Option<VideoJobOutcome>,
}

impl VideoJob {
    pub fn pending(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            done: false,
            outcome: None,
        }
    }

    pub fn finished(id: impl Into<String>, outcome: VideoJobOutcome) -> Self {
        Self {
            id: id.into(),
            done: true,
            outcome: Some(outcome),
        }
    }
}

pub trait GenerationGateway: Send + Sync {
    fn name(&self) -> &str;
    fn generate_model(&self, photo: &UploadFile) -> Result<String>;
    fn composite_garment(&self, base_image: &str, garment: &UploadFile) -> Result<String>;
    fn variate_pose(&self, source_image: &str, pose_instruction: &str) -> Result<String>;
    fn generate_background(&self, base_image: &str, prompt: &str) -> Result<String>;
    fn replace_background(&self, base_image: &str, background: &UploadFile) -> Result<String>;
    fn generate_closeup(&self, base_image: &str, outfit_description: &str) -> Result<String>;
    fn generate_post_copy(&self, request: &PostCopyRequest) -> Result<String>;
    fn submit_video_job(&self, image: &str, template_id: Option<&str>) -> Result<VideoJob>;
    fn poll_video_job(&self, job: &VideoJob) -> Result<VideoJob>;
    fn fetch_video_bytes(&self, locator: &str) -> Result<Vec<u8>>;
}
