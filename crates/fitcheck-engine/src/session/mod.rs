//! The try-on session: one owner for outfit history, overrides, videos and
//! loading state, with one method per user intent.
//!
//! Every generating operation follows the same steps. It first checks its
//! guard under the state lock, clears invalidated state and enters a
//! loading state. It then releases the lock and calls the gateway, and
//! finally re-locks to commit. At most one operation is in flight. A reset
//! bumps the epoch, so results from work that started earlier are dropped
//! at commit time.

mod state;
mod view;

#[cfg(test)]
mod tests;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Instant;

use anyhow::{bail, Result};
use chrono::Utc;
use fitcheck_contracts::catalog::{pose_label, template_or_default, POSE_INSTRUCTIONS};
use fitcheck_contracts::events::EventWriter;
use fitcheck_contracts::outfit::{GarmentRef, OutfitHistory, OutfitLayer};
use fitcheck_contracts::summary::now_utc_iso;
use serde_json::{json, Value};

use crate::config::SessionConfig;
use crate::errors::{error_chain_text, failure_kind, friendly_error_message, SessionFailure};
use crate::gateway::{GenerationGateway, PostCopyRequest, VideoJobOutcome};
use crate::ticker::{Deferred, Ticker};
use crate::upload::UploadFile;
use crate::video::{VideoHandle, VideoVault};

pub use state::{
    ActiveVideo, CarouselProgress, LoadingContext, LoadingState, Outcome, SessionState,
    VideoHistoryItem,
};
pub use view::{
    active_garment_ids, available_pose_labels, base_display_image, current_pose_label,
    display_image, next_pose_index, outfit_description, previous_pose_index, scene_description,
};

pub const VIDEO_LOADING_MESSAGES: [&str; 7] = [
    "Preparing your image for video...",
    "Applying a smooth slow-zoom effect...",
    "Calibrating motion for social media...",
    "Rendering the video frames...",
    "Creating a seamless loop...",
    "Finalizing your dynamic reel...",
    "Your video is almost ready!",
];

pub const EMPTY_VIDEO_MESSAGE: &str = "Video generation finished, but no video was returned. This may be due to content safety filters. Please try a different pose or outfit.";

const CAROUSEL_TOTAL: usize = 4;
const CAROUSEL_ANGLE_SHOTS: usize = 3;

#[derive(Clone)]
pub struct TryOnSession {
    state: Arc<Mutex<SessionState>>,
    carousel_clear: Arc<Mutex<Option<Deferred>>>,
    gateway: Arc<dyn GenerationGateway>,
    vault: Arc<VideoVault>,
    events: EventWriter,
    config: SessionConfig,
    session_dir: PathBuf,
    started_at: String,
}

impl TryOnSession {
    pub fn new(
        session_dir: impl Into<PathBuf>,
        events_path: impl Into<PathBuf>,
        gateway: Arc<dyn GenerationGateway>,
        config: SessionConfig,
    ) -> Result<Self> {
        let session_dir = session_dir.into();
        fs::create_dir_all(&session_dir)?;
        let session_id = session_dir
            .file_name()
            .and_then(|value| value.to_str())
            .filter(|value| !value.is_empty())
            .unwrap_or("session-rs")
            .to_string();
        let events = EventWriter::new(events_path.into(), session_id);
        let vault = VideoVault::new(session_dir.join("videos"))?;

        events.emit_json(
            "session_started",
            json!({
                "out_dir": session_dir.to_string_lossy().to_string(),
                "gateway": gateway.name(),
            }),
        )?;

        Ok(Self {
            state: Arc::new(Mutex::new(SessionState::default())),
            carousel_clear: Arc::new(Mutex::new(None)),
            gateway,
            vault: Arc::new(vault),
            events,
            config,
            session_dir,
            started_at: now_utc_iso(),
        })
    }

    pub fn session_id(&self) -> &str {
        self.events.session_id()
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    pub fn started_at(&self) -> &str {
        &self.started_at
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    pub fn vault(&self) -> &VideoVault {
        &self.vault
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Runs `read` against the current state while holding the lock.
    pub fn inspect<R>(&self, read: impl FnOnce(&SessionState) -> R) -> R {
        read(&self.lock())
    }

    pub fn display_image(&self) -> Option<String> {
        self.inspect(|state| display_image(state).map(str::to_string))
    }

    /// Seeds a fresh history from an already generated model image.
    pub fn finalize_model(&self, image_url: &str) -> Outcome {
        {
            let mut state = self.lock();
            if state.is_loading() {
                return Outcome::Skipped;
            }
            seed_model(&mut state, image_url);
        }
        self.emit("model_finalized", json!({ "image": preview(image_url) }));
        Outcome::Applied
    }

    pub fn create_model(&self, photo: &UploadFile) -> Outcome {
        let guard = {
            let mut state = self.lock();
            if state.is_loading() {
                return Outcome::Skipped;
            }
            if let Err(err) = photo.ensure_image() {
                drop(state);
                return self.reject("create_model", err);
            }
            FlightGuard::enter(
                &self.state,
                &mut state,
                LoadingContext::Canvas,
                "Creating your model...",
            )
        };

        match self.gateway.generate_model(photo) {
            Ok(url) => {
                let outcome = self.complete(guard, |state| seed_model(state, &url));
                if outcome.is_applied() {
                    self.emit("model_finalized", json!({ "image": preview(&url) }));
                }
                outcome
            }
            Err(err) => self.fail(guard, "create_model", "Failed to create model", err, |_| {}),
        }
    }

    /// Dresses the current image in `garment`. Re-selecting the garment of
    /// the next layer just moves forward without a gateway call.
    pub fn select_garment(&self, garment_file: &UploadFile, garment: GarmentRef) -> Outcome {
        let (guard, base_image, layer_index, pose) = {
            let mut state = self.lock();
            let Some(base_image) = base_display_image(&state).map(str::to_string) else {
                return Outcome::Skipped;
            };
            if state.is_loading() {
                return Outcome::Skipped;
            }
            if let Err(err) = garment_file.ensure_image() {
                drop(state);
                return self.reject("select_garment", err);
            }

            self.release_active_video(&mut state);
            state.clear_background();
            state.post_copy = None;
            state.gallery_selection = None;

            let layer_index = state.current_outfit_index;
            let next_matches = state
                .history
                .layer_at(layer_index + 1)
                .and_then(|layer| layer.garment_id())
                .map(|id| id == garment.id)
                .unwrap_or(false);
            if next_matches {
                state.current_outfit_index = layer_index + 1;
                state.current_pose_index = 0;
                drop(state);
                self.emit(
                    "garment_redo",
                    json!({ "garment_id": garment.id, "layer_index": layer_index + 1 }),
                );
                return Outcome::Applied;
            }

            let pose = current_pose_label(&state);
            let guard = FlightGuard::enter(
                &self.state,
                &mut state,
                LoadingContext::Canvas,
                format!("Adding {}...", garment.name),
            );
            (guard, base_image, layer_index, pose)
        };

        let url = match self.gateway.composite_garment(&base_image, garment_file) {
            Ok(url) => url,
            Err(err) => {
                return self.fail(guard, "select_garment", "Failed to add garment", err, |_| {})
            }
        };

        let garment_id = garment.id.clone();
        let mut new_index = layer_index;
        let outcome = self.complete(guard, |state| {
            let layer = OutfitLayer::with_garment(garment.clone(), pose, url.clone());
            new_index = state.history.branch_from(layer_index, layer);
            state.current_outfit_index = new_index;
            state.generation_history.push(url.clone());
            state.wardrobe.insert_if_new(garment);
        });
        if outcome.is_applied() {
            self.emit(
                "garment_applied",
                json!({
                    "garment_id": garment_id,
                    "layer_index": new_index,
                    "pose": pose,
                    "image": preview(&url),
                }),
            );
        }
        outcome
    }

    /// Steps back one layer. The layer stays in history for redo.
    pub fn remove_last_garment(&self) -> Outcome {
        let layer_index = {
            let mut state = self.lock();
            if state.is_loading() || state.current_outfit_index == 0 {
                return Outcome::Skipped;
            }
            self.release_active_video(&mut state);
            state.clear_background();
            state.post_copy = None;
            state.gallery_selection = None;
            state.current_outfit_index -= 1;
            state.current_pose_index = 0;
            state.current_outfit_index
        };
        self.emit("garment_removed", json!({ "layer_index": layer_index }));
        Outcome::Applied
    }

    /// Switches the current pose, rendering it for the current layer when it
    /// is not cached and re-applying an active background scene.
    ///
    /// On failure only the pose index is rolled back. Video, post copy and
    /// background clears already made stay in place.
    pub fn select_pose(&self, new_index: usize) -> Outcome {
        let Some(label) = pose_label(new_index) else {
            return Outcome::Skipped;
        };
        let (guard, plan) = {
            let mut state = self.lock();
            if state.is_loading()
                || state.history.is_empty()
                || new_index == state.current_pose_index
            {
                return Outcome::Skipped;
            }
            self.release_active_video(&mut state);
            state.post_copy = None;

            let previous = state.current_pose_index;
            state.current_pose_index = new_index;
            let layer_index = state.current_outfit_index;
            let layer = state.history.layer_at(layer_index);
            let plan = PosePlan {
                previous,
                layer_index,
                cached: layer
                    .and_then(|layer| layer.pose_image(label))
                    .map(str::to_string),
                source: layer
                    .and_then(|layer| layer.any_pose_image())
                    .map(str::to_string),
                background_id: state.background_id.clone(),
                uploaded_background: state.uploaded_background.clone(),
                gallery_active: state.gallery_selection.is_some(),
            };
            let guard = FlightGuard::enter(
                &self.state,
                &mut state,
                LoadingContext::Canvas,
                "Changing pose...",
            );
            (guard, plan)
        };

        match self.render_pose(&guard, label, &plan) {
            Ok(true) => {
                let outcome = self.finish(guard);
                if outcome.is_applied() {
                    self.emit(
                        "pose_changed",
                        json!({
                            "pose_index": new_index,
                            "pose": label,
                            "cached": plan.cached.is_some(),
                        }),
                    );
                }
                outcome
            }
            Ok(false) => Outcome::Discarded,
            Err(err) => {
                let previous = plan.previous;
                self.fail(guard, "select_pose", "Failed to change pose", err, move |state| {
                    state.current_pose_index = previous;
                })
            }
        }
    }

    fn render_pose(&self, guard: &FlightGuard<'_>, label: &str, plan: &PosePlan) -> Result<bool> {
        let neutral = match plan.cached.clone() {
            Some(url) => url,
            None => {
                let Some(source) = plan.source.as_deref() else {
                    return Err(SessionFailure::unavailable(
                        "No base image available to generate new pose.",
                    )
                    .into());
                };
                guard.set_message("Generating new pose...");
                let url = self.gateway.variate_pose(source, label)?;
                let committed = self.commit(guard, |state| {
                    state.history.record_pose(plan.layer_index, label, &url);
                    state.generation_history.push(url.clone());
                });
                if !committed {
                    return Ok(false);
                }
                self.emit(
                    "pose_generated",
                    json!({
                        "layer_index": plan.layer_index,
                        "pose": label,
                        "image": preview(&url),
                    }),
                );
                url
            }
        };

        match plan.background_id.as_deref() {
            Some(background_id) if !plan.gallery_active => {
                guard.set_message("Applying scene to new pose...");
                let image = match plan.uploaded_background.as_ref() {
                    Some(file) => self.gateway.replace_background(&neutral, file)?,
                    None => self.gateway.generate_background(&neutral, background_id)?,
                };
                let committed = self.commit(guard, |state| {
                    state.background_image = Some(image.clone());
                    state.generation_history.push(image.clone());
                });
                if committed {
                    self.emit(
                        "background_applied",
                        json!({
                            "background_id": background_id,
                            "reapplied": true,
                            "image": preview(&image),
                        }),
                    );
                }
                Ok(committed)
            }
            _ => Ok(self.commit(guard, |state| {
                state.clear_background();
                state.gallery_selection = None;
            })),
        }
    }

    pub fn generate_background(&self, prompt: &str) -> Outcome {
        let prompt = prompt.trim().to_string();
        if prompt.is_empty() {
            return Outcome::Skipped;
        }
        let (guard, base_image) = {
            let mut state = self.lock();
            if state.is_loading() {
                return Outcome::Skipped;
            }
            let Some(base_image) = base_display_image(&state).map(str::to_string) else {
                return Outcome::Skipped;
            };
            self.release_active_video(&mut state);
            state.post_copy = None;
            state.gallery_selection = None;
            state.uploaded_background = None;
            let guard = FlightGuard::enter(
                &self.state,
                &mut state,
                LoadingContext::Canvas,
                format!("Generating scene: {prompt}"),
            );
            (guard, base_image)
        };

        let image = match self.gateway.generate_background(&base_image, &prompt) {
            Ok(image) => image,
            Err(err) => {
                return self.fail(
                    guard,
                    "generate_background",
                    "Failed to generate scene",
                    err,
                    |_| {},
                )
            }
        };
        let cap = self.config.prompt_history_cap;
        let outcome = self.complete(guard, |state| {
            state.background_image = Some(image.clone());
            state.background_id = Some(prompt.clone());
            state.generation_history.push(image.clone());
            state.remember_prompt(&prompt, cap);
        });
        if outcome.is_applied() {
            self.emit(
                "background_applied",
                json!({
                    "background_id": prompt,
                    "reapplied": false,
                    "image": preview(&image),
                }),
            );
        }
        outcome
    }

    pub fn upload_background(&self, file: &UploadFile) -> Outcome {
        let (guard, base_image) = {
            let mut state = self.lock();
            if state.is_loading() {
                return Outcome::Skipped;
            }
            let Some(base_image) = base_display_image(&state).map(str::to_string) else {
                return Outcome::Skipped;
            };
            if let Err(err) = file.ensure_image() {
                drop(state);
                return self.reject("upload_background", err);
            }
            self.release_active_video(&mut state);
            state.post_copy = None;
            state.gallery_selection = None;
            let guard = FlightGuard::enter(
                &self.state,
                &mut state,
                LoadingContext::Canvas,
                "Applying custom scene...",
            );
            (guard, base_image)
        };

        let image = match self.gateway.replace_background(&base_image, file) {
            Ok(image) => image,
            Err(err) => {
                return self.fail(
                    guard,
                    "upload_background",
                    "Failed to apply custom scene",
                    err,
                    |_| {},
                )
            }
        };
        let background_id = format!(
            "{}-{}-{}",
            view::CUSTOM_UPLOAD_PREFIX,
            file.name,
            Utc::now().timestamp_millis()
        );
        let outcome = self.complete(guard, |state| {
            state.background_image = Some(image.clone());
            state.background_id = Some(background_id.clone());
            state.uploaded_background = Some(file.clone());
            state.generation_history.push(image.clone());
        });
        if outcome.is_applied() {
            self.emit(
                "background_applied",
                json!({
                    "background_id": background_id,
                    "reapplied": false,
                    "image": preview(&image),
                }),
            );
        }
        outcome
    }

    pub fn remove_background(&self) -> Outcome {
        {
            let mut state = self.lock();
            if state.is_loading() {
                return Outcome::Skipped;
            }
            self.release_active_video(&mut state);
            state.post_copy = None;
            state.clear_background();
            state.gallery_selection = None;
        }
        self.emit("background_removed", json!({}));
        Outcome::Applied
    }

    /// Views a past result without making it the editing head.
    pub fn select_gallery_image(&self, url: &str) -> Outcome {
        {
            let mut state = self.lock();
            if state.is_loading() {
                return Outcome::Skipped;
            }
            state.gallery_selection = Some(url.to_string());
            self.release_active_video(&mut state);
        }
        self.emit("gallery_selected", json!({ "image": preview(url) }));
        Outcome::Applied
    }

    /// Submits a video job for the base image and polls it to completion.
    /// The loading message cycles while the job runs.
    pub fn generate_video(&self, template_id: Option<&str>) -> Outcome {
        let (guard, base_image) = {
            let mut state = self.lock();
            if state.is_loading() {
                return Outcome::Skipped;
            }
            let Some(base_image) = base_display_image(&state).map(str::to_string) else {
                return Outcome::Skipped;
            };
            self.release_active_video(&mut state);
            state.post_copy = None;
            let guard = FlightGuard::enter(
                &self.state,
                &mut state,
                LoadingContext::Canvas,
                VIDEO_LOADING_MESSAGES[0],
            );
            (guard, base_image)
        };
        let template = template_or_default(Some(
            template_id.unwrap_or(self.config.default_video_template.as_str()),
        ));

        let ticker = self.start_message_ticker(guard.epoch);
        let result = self.run_video_job(guard.epoch, &base_image, template.id);
        drop(ticker);

        let active = match result {
            Ok(handle) => handle,
            Err(err) => {
                return self.fail(guard, "generate_video", "Failed to generate video", err, |_| {})
            }
        };
        let kept = match self.vault.duplicate(&active) {
            Ok(handle) => handle,
            Err(err) => {
                self.vault.release(active);
                return self.fail(guard, "generate_video", "Failed to generate video", err, |_| {});
            }
        };

        let item_id = kept.id().to_string();
        let path = active.path().to_string_lossy().to_string();
        let mut slot = Some((active, kept));
        let outcome = self.complete(guard, |state| {
            if let Some((active, kept)) = slot.take() {
                state.active_video = Some(ActiveVideo {
                    handle: active,
                    source_id: kept.id().to_string(),
                });
                state.video_history.insert(
                    0,
                    VideoHistoryItem {
                        id: kept.id().to_string(),
                        handle: kept,
                        template_id: template.id.to_string(),
                        template_name: template.name.to_string(),
                        template_icon: template.icon.to_string(),
                        created_at: Utc::now(),
                    },
                );
            }
        });
        if let Some((active, kept)) = slot.take() {
            self.vault.release(active);
            self.vault.release(kept);
        }
        if outcome.is_applied() {
            self.emit(
                "video_ready",
                json!({
                    "video_id": item_id,
                    "template_id": template.id,
                    "path": path,
                }),
            );
        }
        outcome
    }

    fn start_message_ticker(&self, epoch: u64) -> Option<Ticker> {
        let state = Arc::clone(&self.state);
        Ticker::start(
            "fitcheck-video-messages",
            self.config.loading_message_cycle,
            move || {
                let mut state = lock_state(&state);
                if state.epoch != epoch {
                    return;
                }
                if let Some(loading) = state.loading.as_mut() {
                    let next = VIDEO_LOADING_MESSAGES
                        .iter()
                        .position(|message| *message == loading.message)
                        .map(|index| (index + 1) % VIDEO_LOADING_MESSAGES.len())
                        .unwrap_or(0);
                    loading.message = VIDEO_LOADING_MESSAGES[next].to_string();
                }
            },
        )
        .ok()
    }

    fn run_video_job(&self, epoch: u64, image: &str, template_id: &str) -> Result<VideoHandle> {
        let mut job = self.gateway.submit_video_job(image, Some(template_id))?;
        self.emit(
            "video_job_submitted",
            json!({ "job_id": job.id, "template_id": template_id }),
        );

        let started = Instant::now();
        let mut polls = 0u64;
        while !job.done {
            if started.elapsed() >= self.config.video_poll_timeout {
                bail!(
                    "Video generation timed out after {}s",
                    self.config.video_poll_timeout.as_secs()
                );
            }
            thread::sleep(self.config.video_poll_interval);
            if self.inspect(|state| state.epoch) != epoch {
                bail!("session was reset while the video was rendering");
            }
            job = self.gateway.poll_video_job(&job)?;
            polls += 1;
            self.emit(
                "video_job_polled",
                json!({ "job_id": job.id, "done": job.done, "polls": polls }),
            );
        }

        match job.outcome {
            Some(VideoJobOutcome::Ready { uri }) => {
                let bytes = self.gateway.fetch_video_bytes(&uri)?;
                self.vault.store(&bytes)
            }
            Some(VideoJobOutcome::Failed { message }) => {
                let message = if message.trim().is_empty() {
                    "Unknown error".to_string()
                } else {
                    message
                };
                bail!("Video generation failed: {message}")
            }
            Some(VideoJobOutcome::Blocked { reason, message }) => {
                bail!("Video generation blocked. Reason: {reason}. {message}")
            }
            Some(VideoJobOutcome::Empty) | None => {
                Err(SessionFailure::gateway(EMPTY_VIDEO_MESSAGE).into())
            }
        }
    }

    pub fn close_video(&self) -> Outcome {
        let closed = {
            let mut state = self.lock();
            self.release_active_video(&mut state)
        };
        if !closed {
            return Outcome::Skipped;
        }
        self.emit("video_closed", json!({}));
        Outcome::Applied
    }

    /// Plays a past video. The active video gets its own copy, so history
    /// and active handles are released independently.
    pub fn select_video(&self, id: &str) -> Outcome {
        let mut state = self.lock();
        let Some(index) = state.video_history_index(id) else {
            return Outcome::Skipped;
        };
        if state
            .active_video
            .as_ref()
            .map(|active| active.source_id == id)
            .unwrap_or(false)
        {
            return Outcome::Applied;
        }
        let copy = match self.vault.duplicate(&state.video_history[index].handle) {
            Ok(copy) => copy,
            Err(err) => {
                let kind = failure_kind(&err);
                let message = friendly_error_message(&err, "Failed to open video");
                state.error = Some(message.clone());
                drop(state);
                self.emit_failure("select_video", &message, &err);
                return Outcome::Failed { kind, message };
            }
        };
        self.release_active_video(&mut state);
        state.active_video = Some(ActiveVideo {
            handle: copy,
            source_id: id.to_string(),
        });
        drop(state);
        self.emit("video_selected", json!({ "video_id": id }));
        Outcome::Applied
    }

    pub fn remove_video(&self, id: &str) -> Outcome {
        {
            let mut state = self.lock();
            let Some(index) = state.video_history_index(id) else {
                return Outcome::Skipped;
            };
            let item = state.video_history.remove(index);
            let playing = state
                .active_video
                .as_ref()
                .map(|active| active.source_id == id)
                .unwrap_or(false);
            if playing {
                self.release_active_video(&mut state);
            }
            self.vault.release(item.handle);
        }
        self.emit("video_removed", json!({ "video_id": id }));
        Outcome::Applied
    }

    pub fn generate_post_copy(&self) -> Outcome {
        let (guard, request) = {
            let mut state = self.lock();
            if state.is_loading() {
                return Outcome::Skipped;
            }
            let Some(image) = display_image(&state).map(str::to_string) else {
                return Outcome::Skipped;
            };
            let request = PostCopyRequest {
                image,
                outfit_description: outfit_description(&state),
                scene_description: scene_description(&state),
                brand_name: Some(state.brand_name.trim().to_string())
                    .filter(|brand| !brand.is_empty()),
            };
            state.post_copy = None;
            let guard = FlightGuard::enter(
                &self.state,
                &mut state,
                LoadingContext::PostCopy,
                "Generating post copy...",
            );
            (guard, request)
        };

        let copy = match self.gateway.generate_post_copy(&request) {
            Ok(copy) => copy,
            Err(err) => {
                return self.fail(
                    guard,
                    "generate_post_copy",
                    "Failed to generate post copy",
                    err,
                    |_| {},
                )
            }
        };
        let chars = copy.chars().count();
        let outcome = self.complete(guard, |state| state.post_copy = Some(copy));
        if outcome.is_applied() {
            self.emit(
                "post_copy_generated",
                json!({
                    "outfit_description": request.outfit_description,
                    "scene_description": request.scene_description,
                    "chars": chars,
                }),
            );
        }
        outcome
    }

    pub fn set_post_copy(&self, text: &str) {
        self.lock().post_copy = Some(text.to_string());
    }

    pub fn set_brand_name(&self, name: &str) {
        self.lock().brand_name = name.trim().to_string();
    }

    pub fn dismiss_error(&self) {
        self.lock().error = None;
    }

    /// Three angle shots from poses after the current one, then a close-up.
    /// Each image lands in `carousel_images` as soon as it arrives.
    pub fn generate_carousel(&self) -> Outcome {
        let (guard, base_image, pose_index, description, run) = {
            let mut state = self.lock();
            if state.is_loading() {
                return Outcome::Skipped;
            }
            let Some(base_image) = base_display_image(&state).map(str::to_string) else {
                return Outcome::Skipped;
            };
            state.carousel_run += 1;
            state.carousel_images.clear();
            state.carousel_progress = Some(CarouselProgress {
                current: 0,
                total: CAROUSEL_TOTAL,
                stage: "Generating Instagram Carousel...".to_string(),
            });
            let pose_index = state.current_pose_index;
            let description = outfit_description(&state);
            let guard = FlightGuard::enter(
                &self.state,
                &mut state,
                LoadingContext::Carousel,
                "Generating Instagram Carousel...",
            );
            (guard, base_image, pose_index, description, state.carousel_run)
        };
        // The superseded clear is a no-op now that the run changed.
        let pending = self.take_carousel_clear();
        drop(pending);
        let epoch = guard.epoch;

        let outcome = match self.render_carousel(&guard, &base_image, pose_index, &description) {
            Ok(Some(images)) => {
                let produced = images.len();
                let mut added = 0usize;
                let outcome = self.complete(guard, |state| {
                    for image in images {
                        if !state.generation_history.contains(&image) {
                            state.generation_history.push(image);
                            added += 1;
                        }
                    }
                    state.carousel_progress = Some(CarouselProgress {
                        current: CAROUSEL_TOTAL,
                        total: CAROUSEL_TOTAL,
                        stage: "Carousel completed!".to_string(),
                    });
                });
                if outcome.is_applied() {
                    self.emit(
                        "carousel_completed",
                        json!({ "images": produced, "added_to_history": added }),
                    );
                }
                outcome
            }
            Ok(None) => Outcome::Discarded,
            Err(err) => self.fail(
                guard,
                "generate_carousel",
                "Failed to generate carousel",
                err,
                |_| {},
            ),
        };
        if !matches!(outcome, Outcome::Discarded) {
            self.schedule_carousel_clear(epoch, run);
        }
        outcome
    }

    fn render_carousel(
        &self,
        guard: &FlightGuard<'_>,
        base_image: &str,
        pose_index: usize,
        description: &str,
    ) -> Result<Option<Vec<String>>> {
        let mut images = Vec::with_capacity(CAROUSEL_TOTAL);
        for shot in 1..=CAROUSEL_ANGLE_SHOTS {
            let stage = format!("Generating angle shot ({shot}/{CAROUSEL_TOTAL})...");
            if !self.report_carousel(guard, shot - 1, &stage) {
                return Ok(None);
            }
            let pose = POSE_INSTRUCTIONS[(pose_index + shot) % POSE_INSTRUCTIONS.len()];
            let image = self.gateway.variate_pose(base_image, pose)?;
            if !self.commit(guard, |state| state.carousel_images.push(image.clone())) {
                return Ok(None);
            }
            images.push(image);
        }

        let stage = format!("Generating close-up shot ({CAROUSEL_TOTAL}/{CAROUSEL_TOTAL})...");
        if !self.report_carousel(guard, CAROUSEL_ANGLE_SHOTS, &stage) {
            return Ok(None);
        }
        let closeup = self.gateway.generate_closeup(base_image, description)?;
        if !self.commit(guard, |state| state.carousel_images.push(closeup.clone())) {
            return Ok(None);
        }
        images.push(closeup);
        Ok(Some(images))
    }

    fn report_carousel(&self, guard: &FlightGuard<'_>, current: usize, stage: &str) -> bool {
        let committed = self.commit(guard, |state| {
            state.carousel_progress = Some(CarouselProgress {
                current,
                total: CAROUSEL_TOTAL,
                stage: stage.to_string(),
            });
            if let Some(loading) = state.loading.as_mut() {
                loading.message = stage.to_string();
            }
        });
        if committed {
            self.emit(
                "carousel_progress",
                json!({ "current": current, "total": CAROUSEL_TOTAL, "stage": stage }),
            );
        }
        committed
    }

    /// Clears the progress of carousel `run` after the configured delay,
    /// unless a reset or a newer carousel got there first.
    fn schedule_carousel_clear(&self, epoch: u64, run: u64) {
        let state = Arc::clone(&self.state);
        let scheduled = Deferred::schedule(
            "fitcheck-carousel-clear",
            self.config.carousel_clear_delay,
            move || {
                let mut state = lock_state(&state);
                if state.epoch == epoch && state.carousel_run == run {
                    state.carousel_progress = None;
                }
            },
        );
        match scheduled {
            Ok(deferred) => {
                let previous = self
                    .carousel_clear
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .replace(deferred);
                drop(previous);
            }
            Err(_) => {
                let mut state = self.lock();
                if state.epoch == epoch && state.carousel_run == run {
                    state.carousel_progress = None;
                }
            }
        }
    }

    fn take_carousel_clear(&self) -> Option<Deferred> {
        self.carousel_clear
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Back to an empty session. Every video handle is released and work
    /// still in flight will be discarded when it returns.
    pub fn reset(&self) {
        let released = self.clear_session();
        self.emit("session_reset", json!({ "released_videos": released }));
    }

    /// Ends the session: like `reset`, every video file is released and
    /// in-flight work is discarded. Call once when the session is done.
    pub fn close(&self) {
        let released = self.clear_session();
        self.emit("session_closed", json!({ "released_videos": released }));
    }

    /// Returns how many video handles were released.
    fn clear_session(&self) -> usize {
        let pending = self.take_carousel_clear();
        drop(pending);

        let mut state = self.lock();
        let epoch = state.epoch + 1;
        let mut released = 0usize;
        if let Some(active) = state.active_video.take() {
            self.vault.release(active.handle);
            released += 1;
        }
        for item in std::mem::take(&mut state.video_history) {
            self.vault.release(item.handle);
            released += 1;
        }
        *state = SessionState {
            epoch,
            ..SessionState::default()
        };
        released
    }

    /// Releases the active video, if any. Returns whether one was playing.
    fn release_active_video(&self, state: &mut SessionState) -> bool {
        match state.active_video.take() {
            Some(active) => {
                self.vault.release(active.handle);
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        lock_state(&self.state)
    }

    /// Applies an intermediate result. `false` means the session was reset.
    fn commit(&self, guard: &FlightGuard<'_>, apply: impl FnOnce(&mut SessionState)) -> bool {
        let mut state = self.lock();
        if !guard.is_current(&state) {
            return false;
        }
        apply(&mut state);
        true
    }

    /// Applies the final result and leaves the loading state in one step.
    fn complete(&self, guard: FlightGuard<'_>, apply: impl FnOnce(&mut SessionState)) -> Outcome {
        let mut state = self.lock();
        if !guard.is_current(&state) {
            return Outcome::Discarded;
        }
        apply(&mut state);
        guard.settle(&mut state);
        Outcome::Applied
    }

    fn finish(&self, guard: FlightGuard<'_>) -> Outcome {
        self.complete(guard, |_| {})
    }

    fn fail(
        &self,
        guard: FlightGuard<'_>,
        operation: &str,
        context: &str,
        err: anyhow::Error,
        rollback: impl FnOnce(&mut SessionState),
    ) -> Outcome {
        let kind = failure_kind(&err);
        let message = friendly_error_message(&err, context);
        {
            let mut state = self.lock();
            if !guard.is_current(&state) {
                return Outcome::Discarded;
            }
            rollback(&mut state);
            state.error = Some(message.clone());
            guard.settle(&mut state);
        }
        self.emit_failure(operation, &message, &err);
        Outcome::Failed { kind, message }
    }

    /// Records a validation failure raised before any loading state.
    fn reject(&self, operation: &str, err: anyhow::Error) -> Outcome {
        let kind = failure_kind(&err);
        let message = friendly_error_message(&err, "Invalid input");
        self.lock().error = Some(message.clone());
        self.emit_failure(operation, &message, &err);
        Outcome::Failed { kind, message }
    }

    fn emit_failure(&self, operation: &str, message: &str, err: &anyhow::Error) {
        self.emit(
            "operation_failed",
            json!({
                "operation": operation,
                "kind": failure_kind(err).as_str(),
                "message": message,
                "detail": error_chain_text(err, 1024),
            }),
        );
    }

    fn emit(&self, event_type: &str, value: Value) {
        let _ = self.events.emit_json(event_type, value);
    }
}

struct PosePlan {
    previous: usize,
    layer_index: usize,
    cached: Option<String>,
    source: Option<String>,
    background_id: Option<String>,
    uploaded_background: Option<UploadFile>,
    gallery_active: bool,
}

/// Marks one operation as in flight. Leaving the loading state happens
/// through `settle` or on drop, and only if no reset happened meanwhile.
struct FlightGuard<'a> {
    state: &'a Mutex<SessionState>,
    epoch: u64,
    settled: bool,
}

impl<'a> FlightGuard<'a> {
    fn enter(
        mutex: &'a Mutex<SessionState>,
        state: &mut SessionState,
        context: LoadingContext,
        message: impl Into<String>,
    ) -> Self {
        state.error = None;
        state.loading = Some(LoadingState {
            context,
            message: message.into(),
        });
        Self {
            state: mutex,
            epoch: state.epoch,
            settled: false,
        }
    }

    fn is_current(&self, state: &SessionState) -> bool {
        state.epoch == self.epoch
    }

    fn set_message(&self, message: &str) {
        let mut state = lock_state(self.state);
        if !self.is_current(&state) {
            return;
        }
        if let Some(loading) = state.loading.as_mut() {
            loading.message = message.to_string();
        }
    }

    fn settle(mut self, state: &mut SessionState) {
        if self.is_current(state) {
            state.loading = None;
        }
        self.settled = true;
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = lock_state(self.state);
        if self.is_current(&state) {
            state.loading = None;
        }
    }
}

fn lock_state(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn seed_model(state: &mut SessionState, image_url: &str) {
    state.model_image = Some(image_url.to_string());
    state.history = OutfitHistory::with_base(POSE_INSTRUCTIONS[0], image_url);
    state.generation_history = vec![image_url.to_string()];
    state.current_outfit_index = 0;
    state.current_pose_index = 0;
    state.post_copy = None;
}

/// Data URLs are huge; log only their head.
fn preview(url: &str) -> String {
    if url.starts_with("data:") {
        return url.chars().take(48).collect::<String>() + "…";
    }
    url.to_string()
}
