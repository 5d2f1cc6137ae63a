use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Mutex, PoisonError};

use anyhow::{bail, Context, Result};
use fitcheck_contracts::outfit::GarmentRef;
use image::{ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};

use super::{GenerationGateway, PostCopyRequest, VideoJob, VideoJobOutcome};
use crate::upload::{data_url, UploadFile};

const SWATCH_SIZE: u32 = 16;

/// Offline gateway. Images are solid-color PNG data URLs whose color is a
/// digest of the inputs, so identical requests give identical images.
pub struct DryrunGateway {
    polls_until_done: u32,
    jobs: Mutex<HashMap<String, u32>>,
}

impl Default for DryrunGateway {
    fn default() -> Self {
        Self::new(2)
    }
}

impl DryrunGateway {
    pub fn new(polls_until_done: u32) -> Self {
        Self {
            polls_until_done,
            jobs: Mutex::new(HashMap::new()),
        }
    }
}

impl GenerationGateway for DryrunGateway {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate_model(&self, photo: &UploadFile) -> Result<String> {
        solid_png_url(&["model", &hex_digest(&photo.bytes)])
    }

    fn composite_garment(&self, base_image: &str, garment: &UploadFile) -> Result<String> {
        solid_png_url(&["tryon", base_image, &hex_digest(&garment.bytes)])
    }

    fn variate_pose(&self, source_image: &str, pose_instruction: &str) -> Result<String> {
        solid_png_url(&["pose", source_image, pose_instruction])
    }

    fn generate_background(&self, base_image: &str, prompt: &str) -> Result<String> {
        solid_png_url(&["background", base_image, prompt])
    }

    fn replace_background(&self, base_image: &str, background: &UploadFile) -> Result<String> {
        solid_png_url(&["replace", base_image, &hex_digest(&background.bytes)])
    }

    fn generate_closeup(&self, base_image: &str, outfit_description: &str) -> Result<String> {
        solid_png_url(&["closeup", base_image, outfit_description])
    }

    fn generate_post_copy(&self, request: &PostCopyRequest) -> Result<String> {
        let outfit = if request.outfit_description.is_empty() {
            "today's look"
        } else {
            request.outfit_description.as_str()
        };
        let mut copy = format!(
            "Styled in {outfit} against {}. #ootd #fitcheck",
            request.scene_description
        );
        if let Some(brand) = request.brand_name.as_deref() {
            copy.push_str(&format!(" @{}", brand.replace(' ', "")));
        }
        Ok(copy)
    }

    fn submit_video_job(&self, image: &str, template_id: Option<&str>) -> Result<VideoJob> {
        let id = format!(
            "dryrun-{}",
            &hex_digest(format!("{image}|{}", template_id.unwrap_or_default()).as_bytes())[..12]
        );
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), 0);
        Ok(VideoJob::pending(id))
    }

    fn poll_video_job(&self, job: &VideoJob) -> Result<VideoJob> {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(polls) = jobs.get_mut(&job.id) else {
            bail!("unknown video job {}", job.id);
        };
        *polls += 1;
        if *polls < self.polls_until_done {
            return Ok(VideoJob::pending(job.id.clone()));
        }
        jobs.remove(&job.id);
        Ok(VideoJob::finished(
            job.id.clone(),
            VideoJobOutcome::Ready {
                uri: format!("dryrun://{}", job.id),
            },
        ))
    }

    fn fetch_video_bytes(&self, locator: &str) -> Result<Vec<u8>> {
        let Some(id) = locator.strip_prefix("dryrun://") else {
            bail!("dryrun gateway cannot download {locator}");
        };
        Ok(format!("fitcheck dryrun video {id}").into_bytes())
    }
}

/// Stand-in upload for a catalog garment when the catalog image is not
/// downloaded.
pub fn swatch_upload(garment: &GarmentRef) -> Result<UploadFile> {
    let seed = format!("{}|{}", garment.id, garment.color.as_deref().unwrap_or_default());
    let bytes = solid_png_bytes(&[&seed])?;
    Ok(UploadFile::new(
        format!("{}.png", garment.id),
        "image/png",
        bytes,
    ))
}

fn solid_png_url(parts: &[&str]) -> Result<String> {
    Ok(data_url("image/png", &solid_png_bytes(parts)?))
}

fn solid_png_bytes(parts: &[&str]) -> Result<Vec<u8>> {
    let (r, g, b) = color_from_parts(parts);
    let image = RgbImage::from_pixel(SWATCH_SIZE, SWATCH_SIZE, Rgb([r, g, b]));
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, ImageFormat::Png)
        .context("failed to encode dryrun png")?;
    Ok(cursor.into_inner())
}

fn color_from_parts(parts: &[&str]) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

fn hex_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
