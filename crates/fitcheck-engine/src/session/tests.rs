use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use fitcheck_contracts::catalog::POSE_INSTRUCTIONS;
use fitcheck_contracts::outfit::GarmentRef;

use super::{
    display_image, LoadingContext, Outcome, TryOnSession, EMPTY_VIDEO_MESSAGE,
    VIDEO_LOADING_MESSAGES,
};
use crate::config::SessionConfig;
use crate::errors::FailureKind;
use crate::gateway::{
    swatch_upload, GenerationGateway, PostCopyRequest, VideoJob, VideoJobOutcome,
};
use crate::upload::UploadFile;

const BASE: &str = "https://img.test/base.png";

/// In-memory gateway that records every call. Capabilities can be told to
/// fail once, return a fixed value, or block until the test releases them.
struct ScriptedGateway {
    calls: Mutex<Vec<(String, Vec<String>)>>,
    next_id: AtomicUsize,
    failures: Mutex<HashMap<String, String>>,
    fixed: Mutex<HashMap<String, String>>,
    holds: Mutex<HashMap<String, Receiver<()>>>,
    video_outcome: Mutex<VideoJobOutcome>,
}

impl ScriptedGateway {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
            failures: Mutex::new(HashMap::new()),
            fixed: Mutex::new(HashMap::new()),
            holds: Mutex::new(HashMap::new()),
            video_outcome: Mutex::new(VideoJobOutcome::Ready {
                uri: "https://video.test/clip?alt=media".to_string(),
            }),
        })
    }

    fn fail_next(&self, capability: &str, message: &str) {
        self.failures
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .insert(capability.to_string(), message.to_string());
    }

    fn respond_with(&self, capability: &str, value: &str) {
        self.fixed
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .insert(capability.to_string(), value.to_string());
    }

    /// The next call to `capability` blocks until the returned sender fires.
    fn hold(&self, capability: &str) -> Sender<()> {
        let (tx, rx) = mpsc::channel();
        self.holds
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .insert(capability.to_string(), rx);
        tx
    }

    fn set_video_outcome(&self, outcome: VideoJobOutcome) {
        *self
            .video_outcome
            .lock()
            .unwrap_or_else(|err| err.into_inner()) = outcome;
    }

    fn calls_to(&self, capability: &str) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .iter()
            .filter(|(name, _)| name == capability)
            .map(|(_, args)| args.clone())
            .collect()
    }

    fn count(&self, capability: &str) -> usize {
        self.calls_to(capability).len()
    }

    fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .len()
    }

    fn call(&self, capability: &str, args: &[&str]) -> Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push((
                capability.to_string(),
                args.iter().map(|arg| arg.to_string()).collect(),
            ));
        let hold = self
            .holds
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .remove(capability);
        if let Some(release) = hold {
            let _ = release.recv_timeout(Duration::from_secs(5));
        }
        let failure = self
            .failures
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .remove(capability);
        if let Some(message) = failure {
            bail!("{message}");
        }
        Ok(())
    }

    fn image(&self, capability: &str, args: &[&str]) -> Result<String> {
        self.call(capability, args)?;
        if let Some(value) = self
            .fixed
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .get(capability)
        {
            return Ok(value.clone());
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("https://img.test/{capability}-{id}.png"))
    }
}

impl GenerationGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate_model(&self, photo: &UploadFile) -> Result<String> {
        self.image("generate_model", &[&photo.name])
    }

    fn composite_garment(&self, base_image: &str, garment: &UploadFile) -> Result<String> {
        self.image("composite_garment", &[base_image, &garment.name])
    }

    fn variate_pose(&self, source_image: &str, pose_instruction: &str) -> Result<String> {
        self.image("variate_pose", &[source_image, pose_instruction])
    }

    fn generate_background(&self, base_image: &str, prompt: &str) -> Result<String> {
        self.image("generate_background", &[base_image, prompt])
    }

    fn replace_background(&self, base_image: &str, background: &UploadFile) -> Result<String> {
        self.image("replace_background", &[base_image, &background.name])
    }

    fn generate_closeup(&self, base_image: &str, outfit_description: &str) -> Result<String> {
        self.image("generate_closeup", &[base_image, outfit_description])
    }

    fn generate_post_copy(&self, request: &PostCopyRequest) -> Result<String> {
        self.call(
            "generate_post_copy",
            &[
                &request.image,
                &request.outfit_description,
                &request.scene_description,
                request.brand_name.as_deref().unwrap_or(""),
            ],
        )?;
        Ok(format!("Loving this {} look", request.outfit_description))
    }

    fn submit_video_job(&self, image: &str, template_id: Option<&str>) -> Result<VideoJob> {
        self.call("submit_video_job", &[image, template_id.unwrap_or("")])?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(VideoJob::pending(format!("job-{id}")))
    }

    fn poll_video_job(&self, job: &VideoJob) -> Result<VideoJob> {
        self.call("poll_video_job", &[&job.id])?;
        let outcome = self
            .video_outcome
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone();
        Ok(VideoJob::finished(job.id.clone(), outcome))
    }

    fn fetch_video_bytes(&self, locator: &str) -> Result<Vec<u8>> {
        self.call("fetch_video_bytes", &[locator])?;
        Ok(b"not-really-an-mp4".to_vec())
    }
}

fn fast_config() -> SessionConfig {
    SessionConfig {
        video_poll_interval: Duration::from_millis(1),
        video_poll_timeout: Duration::from_secs(5),
        loading_message_cycle: Duration::from_millis(5),
        carousel_clear_delay: Duration::from_millis(150),
        ..SessionConfig::default()
    }
}

fn new_session(gateway: &Arc<ScriptedGateway>, dir: &Path) -> Result<TryOnSession> {
    let dynamic: Arc<dyn GenerationGateway> = gateway.clone();
    TryOnSession::new(
        dir.join("session-test"),
        dir.join("events.jsonl"),
        dynamic,
        fast_config(),
    )
}

fn seeded_session(gateway: &Arc<ScriptedGateway>, dir: &Path) -> Result<TryOnSession> {
    let session = new_session(gateway, dir)?;
    assert_eq!(session.finalize_model(BASE), Outcome::Applied);
    Ok(session)
}

fn garment(id: &str, name: &str) -> Result<(UploadFile, GarmentRef)> {
    let garment = GarmentRef::new(id, name, format!("https://img.test/{id}.png"));
    Ok((swatch_upload(&garment)?, garment))
}

fn wear(session: &TryOnSession, id: &str, name: &str) -> Result<Outcome> {
    let (file, garment) = garment(id, name)?;
    Ok(session.select_garment(&file, garment))
}

fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        if Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        thread::sleep(Duration::from_millis(2));
    }
}

fn layer_ids(session: &TryOnSession) -> Vec<Option<String>> {
    session.inspect(|state| {
        state
            .history
            .layers()
            .iter()
            .map(|layer| layer.garment_id().map(str::to_string))
            .collect()
    })
}

#[test]
fn finalize_model_seeds_single_layer_history() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let gateway = ScriptedGateway::new();
    let session = seeded_session(&gateway, temp.path())?;

    session.inspect(|state| {
        assert_eq!(state.history.len(), 1);
        assert_eq!(
            state.history.layer_at(0).and_then(|layer| layer.pose_image(POSE_INSTRUCTIONS[0])),
            Some(BASE)
        );
        assert_eq!(state.current_outfit_index, 0);
        assert_eq!(state.current_pose_index, 0);
        assert_eq!(state.generation_history, vec![BASE.to_string()]);
        assert_eq!(display_image(state), Some(BASE));
    });
    assert_eq!(gateway.total_calls(), 0);
    Ok(())
}

#[test]
fn create_model_validates_then_seeds() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let gateway = ScriptedGateway::new();
    let session = new_session(&gateway, temp.path())?;

    let text = UploadFile::new("notes.txt", "text/plain", b"hello".to_vec());
    assert_eq!(
        session.create_model(&text),
        Outcome::Failed {
            kind: FailureKind::InvalidInput,
            message: "Please select an image file.".to_string(),
        }
    );
    assert_eq!(gateway.count("generate_model"), 0);

    let (photo, _) = garment("selfie", "Selfie")?;
    assert_eq!(session.create_model(&photo), Outcome::Applied);
    session.inspect(|state| {
        assert_eq!(state.history.len(), 1);
        assert!(state.error.is_none());
        assert!(state.loading.is_none());
        assert_eq!(state.generation_history.len(), 1);
    });
    Ok(())
}

#[test]
fn garment_pose_and_undo_scenario() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let gateway = ScriptedGateway::new();
    let session = seeded_session(&gateway, temp.path())?;

    assert_eq!(wear(&session, "tech-jacket", "Tech Jacket")?, Outcome::Applied);
    let image_a = session.inspect(|state| {
        assert_eq!(state.history.len(), 2);
        assert_eq!(state.current_outfit_index, 1);
        state
            .history
            .layer_at(1)
            .and_then(|layer| layer.any_pose_image())
            .unwrap_or_default()
            .to_string()
    });
    assert_eq!(gateway.calls_to("composite_garment")[0][0], BASE);
    session.inspect(|state| {
        assert_eq!(state.generation_history, vec![BASE.to_string(), image_a.clone()]);
        assert!(state.wardrobe.contains("tech-jacket"));
    });

    assert_eq!(session.select_pose(2), Outcome::Applied);
    let image_b = session.inspect(|state| {
        let layer = state.history.layer_at(1).cloned();
        let layer = layer.unwrap_or_else(|| panic!("layer 1 missing"));
        assert_eq!(layer.pose_count(), 2);
        layer.pose_image(POSE_INSTRUCTIONS[2]).unwrap_or_default().to_string()
    });
    assert_eq!(
        gateway.calls_to("variate_pose"),
        vec![vec![image_a.clone(), POSE_INSTRUCTIONS[2].to_string()]]
    );
    session.inspect(|state| {
        assert_eq!(
            state.generation_history,
            vec![BASE.to_string(), image_a.clone(), image_b.clone()]
        );
        assert_eq!(display_image(state), Some(image_b.as_str()));
    });

    let calls_before_undo = gateway.total_calls();
    assert_eq!(session.remove_last_garment(), Outcome::Applied);
    session.inspect(|state| {
        assert_eq!(state.current_outfit_index, 0);
        assert_eq!(state.current_pose_index, 0);
        assert_eq!(display_image(state), Some(BASE));
        assert_eq!(state.history.len(), 2);
    });
    assert_eq!(gateway.total_calls(), calls_before_undo);
    assert_eq!(session.remove_last_garment(), Outcome::Skipped);

    let events = session.events().event_types();
    for expected in [
        "session_started",
        "model_finalized",
        "garment_applied",
        "pose_generated",
        "pose_changed",
        "garment_removed",
    ] {
        assert!(events.iter().any(|event| event == expected), "missing {expected}");
    }
    Ok(())
}

#[test]
fn new_garment_mid_history_truncates_forward_layers() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let gateway = ScriptedGateway::new();
    let session = seeded_session(&gateway, temp.path())?;

    for (id, name) in [("l1", "Layer 1"), ("l2", "Layer 2"), ("l3", "Layer 3")] {
        assert_eq!(wear(&session, id, name)?, Outcome::Applied);
    }
    assert_eq!(session.inspect(|state| state.current_outfit_index), 3);

    session.remove_last_garment();
    session.remove_last_garment();
    assert_eq!(session.inspect(|state| state.current_outfit_index), 1);

    assert_eq!(wear(&session, "fresh", "Fresh")?, Outcome::Applied);
    assert_eq!(
        layer_ids(&session),
        vec![None, Some("l1".to_string()), Some("fresh".to_string())]
    );
    assert_eq!(session.inspect(|state| state.current_outfit_index), 2);
    Ok(())
}

#[test]
fn reselecting_next_layer_garment_skips_gateway() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let gateway = ScriptedGateway::new();
    let session = seeded_session(&gateway, temp.path())?;

    wear(&session, "l1", "Layer 1")?;
    wear(&session, "l2", "Layer 2")?;
    session.remove_last_garment();
    session.remove_last_garment();
    assert_eq!(gateway.count("composite_garment"), 2);

    for expected_index in [1usize, 2] {
        let id = format!("l{expected_index}");
        assert_eq!(wear(&session, &id, "again")?, Outcome::Applied);
        session.inspect(|state| {
            assert_eq!(state.current_outfit_index, expected_index);
            assert_eq!(state.current_pose_index, 0);
        });
    }
    assert_eq!(gateway.count("composite_garment"), 2);
    assert_eq!(session.inspect(|state| state.history.len()), 3);
    Ok(())
}

#[test]
fn cached_pose_is_never_regenerated() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let gateway = ScriptedGateway::new();
    let session = seeded_session(&gateway, temp.path())?;
    wear(&session, "l1", "Layer 1")?;

    assert_eq!(session.select_pose(2), Outcome::Applied);
    assert_eq!(session.select_pose(0), Outcome::Applied);
    assert_eq!(session.select_pose(2), Outcome::Applied);
    assert_eq!(session.select_pose(2), Outcome::Skipped);
    assert_eq!(gateway.count("variate_pose"), 1);
    assert_eq!(
        session.inspect(|state| state.history.layer_at(1).map(|layer| layer.pose_count())),
        Some(2)
    );
    Ok(())
}

#[test]
fn pose_change_reapplies_prompt_background_unless_gallery_selected() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let gateway = ScriptedGateway::new();
    let session = seeded_session(&gateway, temp.path())?;

    assert_eq!(session.generate_background("beach"), Outcome::Applied);
    let image_c = session.inspect(|state| {
        assert_eq!(state.background_id.as_deref(), Some("beach"));
        assert_eq!(state.prompt_history, vec!["beach".to_string()]);
        state.background_image.clone().unwrap_or_default()
    });
    assert_eq!(gateway.calls_to("generate_background")[0], vec![BASE, "beach"]);

    assert_eq!(session.select_pose(1), Outcome::Applied);
    let neutral = session.inspect(|state| {
        state
            .history
            .layer_at(0)
            .and_then(|layer| layer.pose_image(POSE_INSTRUCTIONS[1]))
            .unwrap_or_default()
            .to_string()
    });
    let reapplied = gateway.calls_to("generate_background");
    assert_eq!(reapplied.len(), 2);
    assert_eq!(reapplied[1], vec![neutral.clone(), "beach".to_string()]);
    let image_d = session.inspect(|state| {
        let image = state.background_image.clone().unwrap_or_default();
        assert_ne!(image, image_c);
        assert_eq!(state.background_id.as_deref(), Some("beach"));
        assert_eq!(state.generation_history.last(), Some(&image));
        image
    });
    assert_eq!(session.display_image(), Some(image_d));

    assert_eq!(session.select_gallery_image(&image_c), Outcome::Applied);
    assert_eq!(session.display_image(), Some(image_c.clone()));
    assert_eq!(session.select_pose(2), Outcome::Applied);
    assert_eq!(gateway.count("generate_background"), 2);
    session.inspect(|state| {
        assert!(state.background_image.is_none());
        assert!(state.background_id.is_none());
        assert!(state.gallery_selection.is_none());
    });
    Ok(())
}

#[test]
fn pose_change_reapplies_uploaded_background_with_file() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let gateway = ScriptedGateway::new();
    let session = seeded_session(&gateway, temp.path())?;

    let (background, _) = garment("loft", "Loft")?;
    assert_eq!(session.upload_background(&background), Outcome::Applied);
    session.inspect(|state| {
        let id = state.background_id.clone().unwrap_or_default();
        assert!(id.starts_with("custom-upload-loft.png-"));
        assert!(state.uploaded_background.is_some());
    });

    assert_eq!(session.select_pose(4), Outcome::Applied);
    let calls = gateway.calls_to("replace_background");
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1][1], "loft.png");
    assert_eq!(gateway.count("generate_background"), 0);

    assert_eq!(session.generate_background("rooftop"), Outcome::Applied);
    session.inspect(|state| {
        assert!(state.uploaded_background.is_none());
        assert_eq!(state.background_id.as_deref(), Some("rooftop"));
    });

    assert_eq!(session.remove_background(), Outcome::Applied);
    session.inspect(|state| {
        assert!(state.background_image.is_none());
        assert!(state.background_id.is_none());
    });
    Ok(())
}

#[test]
fn failed_pose_change_reverts_index_but_keeps_clears() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let gateway = ScriptedGateway::new();
    let session = seeded_session(&gateway, temp.path())?;

    session.generate_background("beach");
    assert_eq!(session.generate_video(None), Outcome::Applied);
    assert_eq!(session.generate_post_copy(), Outcome::Applied);

    gateway.fail_next("variate_pose", "model exploded");
    assert_eq!(
        session.select_pose(3),
        Outcome::Failed {
            kind: FailureKind::Gateway,
            message: "Failed to change pose. model exploded".to_string(),
        }
    );
    session.inspect(|state| {
        assert_eq!(state.current_pose_index, 0);
        assert!(state.active_video.is_none());
        assert!(state.post_copy.is_none());
        assert_eq!(state.background_id.as_deref(), Some("beach"));
        assert!(state.loading.is_none());
        assert_eq!(
            state.error.as_deref(),
            Some("Failed to change pose. model exploded")
        );
    });
    assert_eq!(session.vault().outstanding(), 1);

    session.dismiss_error();
    assert!(session.inspect(|state| state.error.is_none()));
    Ok(())
}

#[test]
fn failed_garment_leaves_history_untouched() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let gateway = ScriptedGateway::new();
    let session = seeded_session(&gateway, temp.path())?;

    gateway.fail_next("composite_garment", "API Error: 429 - Too Many Requests");
    let outcome = wear(&session, "l1", "Layer 1")?;
    assert_eq!(
        outcome,
        Outcome::Failed {
            kind: FailureKind::Gateway,
            message: "We're experiencing high traffic right now. Please wait a moment and try again."
                .to_string(),
        }
    );
    session.inspect(|state| {
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.current_outfit_index, 0);
        assert_eq!(state.generation_history.len(), 1);
        assert!(!state.wardrobe.contains("l1"));
        assert!(state.loading.is_none());
    });

    assert_eq!(wear(&session, "l1", "Layer 1")?, Outcome::Applied);
    assert!(session.inspect(|state| state.error.is_none()));
    Ok(())
}

#[test]
fn non_image_garment_is_rejected_before_gateway() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let gateway = ScriptedGateway::new();
    let session = seeded_session(&gateway, temp.path())?;

    let file = UploadFile::new("notes.txt", "text/plain", b"hello".to_vec());
    let outcome = session.select_garment(&file, GarmentRef::new("notes", "Notes", "notes.txt"));
    assert!(matches!(
        outcome,
        Outcome::Failed {
            kind: FailureKind::InvalidInput,
            ..
        }
    ));
    assert_eq!(gateway.total_calls(), 0);
    assert_eq!(
        session.inspect(|state| state.error.clone()),
        Some("Please select an image file.".to_string())
    );
    Ok(())
}

#[test]
fn video_generation_records_active_and_history() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let gateway = ScriptedGateway::new();
    let session = seeded_session(&gateway, temp.path())?;

    assert_eq!(session.generate_video(Some("spin-showcase")), Outcome::Applied);
    assert_eq!(
        gateway.calls_to("submit_video_job"),
        vec![vec![BASE.to_string(), "spin-showcase".to_string()]]
    );
    assert_eq!(
        gateway.calls_to("fetch_video_bytes"),
        vec![vec!["https://video.test/clip?alt=media".to_string()]]
    );
    session.inspect(|state| {
        assert_eq!(state.video_history.len(), 1);
        let item = &state.video_history[0];
        assert_eq!(item.template_id, "spin-showcase");
        assert_eq!(item.template_name, "360° Spin");
        let active = state.active_video.as_ref().unwrap_or_else(|| panic!("no active video"));
        assert_eq!(active.source_id, item.id);
        assert_ne!(active.handle.path(), item.handle.path());
        assert!(active.handle.path().exists());
        assert!(state.loading.is_none());
    });

    assert_eq!(session.generate_video(None), Outcome::Applied);
    assert_eq!(gateway.calls_to("submit_video_job")[1][1], "runway-walk");
    assert_eq!(session.inspect(|state| state.video_history.len()), 2);
    assert_eq!(session.vault().outstanding(), 3);
    Ok(())
}

#[test]
fn video_terminal_failures_become_errors() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let gateway = ScriptedGateway::new();
    let session = seeded_session(&gateway, temp.path())?;

    gateway.set_video_outcome(VideoJobOutcome::Blocked {
        reason: "SAFETY".to_string(),
        message: "Person generation is restricted.".to_string(),
    });
    assert_eq!(
        session.generate_video(None),
        Outcome::Failed {
            kind: FailureKind::Gateway,
            message: "Failed to generate video. Video generation blocked. Reason: SAFETY. Person generation is restricted."
                .to_string(),
        }
    );

    gateway.set_video_outcome(VideoJobOutcome::Failed {
        message: "quota exhausted".to_string(),
    });
    let Outcome::Failed { message, .. } = session.generate_video(None) else {
        panic!("expected failure");
    };
    assert_eq!(message, "Failed to generate video. Video generation failed: quota exhausted");

    gateway.set_video_outcome(VideoJobOutcome::Empty);
    let Outcome::Failed { message, .. } = session.generate_video(None) else {
        panic!("expected failure");
    };
    assert!(message.ends_with(EMPTY_VIDEO_MESSAGE));

    assert_eq!(gateway.count("fetch_video_bytes"), 0);
    assert_eq!(session.vault().outstanding(), 0);
    session.inspect(|state| {
        assert!(state.active_video.is_none());
        assert!(state.video_history.is_empty());
        assert!(state.loading.is_none());
    });
    Ok(())
}

#[test]
fn second_video_request_while_one_runs_is_ignored() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let gateway = ScriptedGateway::new();
    let session = seeded_session(&gateway, temp.path())?;

    let release = gateway.hold("submit_video_job");
    let worker = session.clone();
    let running = thread::spawn(move || worker.generate_video(None));

    wait_until("first submit", || gateway.count("submit_video_job") == 1);
    session.inspect(|state| {
        let loading = state.loading.clone().unwrap_or_else(|| panic!("not loading"));
        assert_eq!(loading.context, LoadingContext::Canvas);
    });

    assert_eq!(session.generate_video(None), Outcome::Skipped);
    assert_eq!(session.select_pose(3), Outcome::Skipped);
    assert_eq!(session.generate_carousel(), Outcome::Skipped);
    assert_eq!(gateway.count("submit_video_job"), 1);

    let _ = release.send(());
    let outcome = running.join().unwrap_or_else(|_| panic!("video worker panicked"));
    assert_eq!(outcome, Outcome::Applied);

    assert_eq!(session.generate_video(None), Outcome::Applied);
    assert_eq!(gateway.count("submit_video_job"), 2);
    Ok(())
}

#[test]
fn video_loading_message_cycles_while_waiting() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let gateway = ScriptedGateway::new();
    let session = seeded_session(&gateway, temp.path())?;

    let release = gateway.hold("submit_video_job");
    let worker = session.clone();
    let running = thread::spawn(move || worker.generate_video(None));

    wait_until("message rotation", || {
        session.inspect(|state| {
            state
                .loading
                .as_ref()
                .map(|loading| {
                    loading.message != VIDEO_LOADING_MESSAGES[0]
                        && VIDEO_LOADING_MESSAGES.contains(&loading.message.as_str())
                })
                .unwrap_or(false)
        })
    });

    let _ = release.send(());
    let outcome = running.join().unwrap_or_else(|_| panic!("video worker panicked"));
    assert_eq!(outcome, Outcome::Applied);
    assert!(session.inspect(|state| state.loading.is_none()));
    Ok(())
}

#[test]
fn reset_mid_job_discards_result() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let gateway = ScriptedGateway::new();
    let session = seeded_session(&gateway, temp.path())?;

    let release = gateway.hold("submit_video_job");
    let worker = session.clone();
    let running = thread::spawn(move || worker.generate_video(None));
    wait_until("submit", || gateway.count("submit_video_job") == 1);

    session.reset();
    let _ = release.send(());
    let outcome = running.join().unwrap_or_else(|_| panic!("video worker panicked"));
    assert_eq!(outcome, Outcome::Discarded);

    session.inspect(|state| {
        assert!(state.active_video.is_none());
        assert!(state.video_history.is_empty());
        assert!(state.loading.is_none());
        assert!(state.error.is_none());
        assert!(state.history.is_empty());
    });
    assert_eq!(gateway.count("fetch_video_bytes"), 0);
    assert_eq!(session.vault().outstanding(), 0);
    Ok(())
}

#[test]
fn reset_releases_every_video_exactly_once() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let gateway = ScriptedGateway::new();
    let session = seeded_session(&gateway, temp.path())?;

    wear(&session, "l1", "Layer 1")?;
    session.generate_background("beach");
    session.set_brand_name("Maison Noir");
    assert_eq!(session.generate_video(None), Outcome::Applied);
    assert_eq!(session.generate_video(None), Outcome::Applied);
    let older = session.inspect(|state| state.video_history[1].id.clone());
    assert_eq!(session.select_video(&older), Outcome::Applied);
    assert_eq!(session.vault().outstanding(), 3);

    session.reset();

    assert_eq!(session.vault().outstanding(), 0);
    let released = session.vault().released_ids();
    assert_eq!(released.len(), 5);
    assert_eq!(released.iter().collect::<BTreeSet<_>>().len(), 5);
    let leftover = std::fs::read_dir(session.vault().dir())?.count();
    assert_eq!(leftover, 0);

    session.inspect(|state| {
        assert!(state.model_image.is_none());
        assert!(state.history.is_empty());
        assert_eq!(state.current_outfit_index, 0);
        assert_eq!(state.current_pose_index, 0);
        assert!(state.background_image.is_none());
        assert!(state.background_id.is_none());
        assert!(state.uploaded_background.is_none());
        assert!(state.gallery_selection.is_none());
        assert!(state.active_video.is_none());
        assert!(state.video_history.is_empty());
        assert!(state.generation_history.is_empty());
        assert!(state.prompt_history.is_empty());
        assert!(state.brand_name.is_empty());
        assert!(!state.wardrobe.contains("l1"));
        assert_eq!(display_image(state), None);
    });
    assert!(session
        .events()
        .event_types()
        .iter()
        .any(|event| event == "session_reset"));
    Ok(())
}

#[test]
fn video_history_select_remove_and_close() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let gateway = ScriptedGateway::new();
    let session = seeded_session(&gateway, temp.path())?;

    session.generate_video(None);
    session.generate_video(None);
    let (newest, older) =
        session.inspect(|state| (state.video_history[0].id.clone(), state.video_history[1].id.clone()));
    assert_eq!(
        session.inspect(|state| state.active_video.as_ref().map(|video| video.source_id.clone())),
        Some(newest.clone())
    );

    assert_eq!(session.remove_video(&newest), Outcome::Applied);
    session.inspect(|state| {
        assert!(state.active_video.is_none());
        assert_eq!(state.video_history.len(), 1);
    });
    assert_eq!(session.vault().outstanding(), 1);
    assert_eq!(session.remove_video(&newest), Outcome::Skipped);

    assert_eq!(session.select_video(&older), Outcome::Applied);
    assert_eq!(session.vault().outstanding(), 2);
    assert_eq!(session.close_video(), Outcome::Applied);
    assert_eq!(session.close_video(), Outcome::Skipped);
    assert_eq!(session.vault().outstanding(), 1);

    session.select_video(&older);
    let past = "https://img.test/past-look.png";
    assert_eq!(session.select_gallery_image(past), Outcome::Applied);
    assert!(session.inspect(|state| state.active_video.is_none()));
    assert_eq!(session.display_image(), Some(past.to_string()));
    assert_eq!(session.vault().outstanding(), 1);
    Ok(())
}

#[test]
fn post_copy_uses_outfit_scene_and_brand() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let gateway = ScriptedGateway::new();
    let session = seeded_session(&gateway, temp.path())?;

    wear(&session, "tech-jacket", "Tech Jacket")?;
    wear(&session, "denim-jeans", "Denim Jeans")?;
    session.generate_background("a rainy Tokyo street");
    session.set_brand_name("  Maison Noir ");

    assert_eq!(session.generate_post_copy(), Outcome::Applied);
    let display = session.display_image().unwrap_or_default();
    assert_eq!(
        gateway.calls_to("generate_post_copy"),
        vec![vec![
            display,
            "Tech Jacket, Denim Jeans".to_string(),
            "a rainy Tokyo street".to_string(),
            "Maison Noir".to_string(),
        ]]
    );
    assert_eq!(
        session.inspect(|state| state.post_copy.clone()),
        Some("Loving this Tech Jacket, Denim Jeans look".to_string())
    );

    session.set_post_copy("Edited by hand #ootd");
    assert_eq!(
        session.inspect(|state| state.post_copy.clone()),
        Some("Edited by hand #ootd".to_string())
    );
    assert_eq!(gateway.count("generate_post_copy"), 1);

    session.remove_background();
    assert!(session.inspect(|state| state.post_copy.is_none()));
    session.generate_post_copy();
    assert_eq!(
        gateway.calls_to("generate_post_copy")[1][2],
        "a neutral studio background"
    );
    Ok(())
}

#[test]
fn carousel_streams_three_angles_and_closeup() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let gateway = ScriptedGateway::new();
    let session = seeded_session(&gateway, temp.path())?;

    wear(&session, "tech-jacket", "Tech Jacket")?;
    session.select_pose(4);
    let base = session.inspect(|state| super::base_display_image(state).unwrap_or_default().to_string());
    let history_before = session.inspect(|state| state.generation_history.len());
    gateway.respond_with("generate_closeup", BASE);

    assert_eq!(session.generate_carousel(), Outcome::Applied);

    let poses: Vec<Vec<String>> = gateway.calls_to("variate_pose").into_iter().skip(1).collect();
    assert_eq!(
        poses,
        vec![
            vec![base.clone(), POSE_INSTRUCTIONS[5].to_string()],
            vec![base.clone(), POSE_INSTRUCTIONS[0].to_string()],
            vec![base.clone(), POSE_INSTRUCTIONS[1].to_string()],
        ]
    );
    assert_eq!(
        gateway.calls_to("generate_closeup"),
        vec![vec![base, "Tech Jacket".to_string()]]
    );
    session.inspect(|state| {
        assert_eq!(state.carousel_images.len(), 4);
        assert_eq!(state.carousel_images[3], BASE);
        assert_eq!(state.generation_history.len(), history_before + 3);
        let progress = state
            .carousel_progress
            .clone()
            .unwrap_or_else(|| panic!("progress cleared too early"));
        assert_eq!((progress.current, progress.total), (4, 4));
        assert_eq!(progress.stage, "Carousel completed!");
        assert!(state.loading.is_none());
    });

    wait_until("progress clear", || {
        session.inspect(|state| state.carousel_progress.is_none())
    });
    Ok(())
}

#[test]
fn carousel_failure_sets_error_and_still_clears_progress() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let gateway = ScriptedGateway::new();
    let session = seeded_session(&gateway, temp.path())?;

    gateway.fail_next("generate_closeup", r#"{"error":{"message":"closeup unavailable"}}"#);
    let outcome = session.generate_carousel();
    assert_eq!(
        outcome,
        Outcome::Failed {
            kind: FailureKind::Gateway,
            message: "Failed to generate carousel. closeup unavailable".to_string(),
        }
    );
    session.inspect(|state| {
        assert_eq!(state.carousel_images.len(), 3);
        assert_eq!(state.generation_history.len(), 1);
    });
    wait_until("progress clear", || {
        session.inspect(|state| state.carousel_progress.is_none())
    });
    Ok(())
}

#[test]
fn skipped_carousel_keeps_earlier_progress_clear() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let gateway = ScriptedGateway::new();
    let session = seeded_session(&gateway, temp.path())?;

    assert_eq!(session.generate_carousel(), Outcome::Applied);
    assert!(session.inspect(|state| state.carousel_progress.is_some()));

    let release = gateway.hold("submit_video_job");
    let worker = session.clone();
    let running = thread::spawn(move || worker.generate_video(None));
    wait_until("submit", || gateway.count("submit_video_job") == 1);

    assert_eq!(session.generate_carousel(), Outcome::Skipped);
    wait_until("progress clear", || {
        session.inspect(|state| state.carousel_progress.is_none())
    });

    let _ = release.send(());
    let outcome = running.join().unwrap_or_else(|_| panic!("video worker panicked"));
    assert_eq!(outcome, Outcome::Applied);
    Ok(())
}

#[test]
fn newer_carousel_is_not_cleared_by_older_timer() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let gateway = ScriptedGateway::new();
    let session = seeded_session(&gateway, temp.path())?;

    assert_eq!(session.generate_carousel(), Outcome::Applied);
    let release = gateway.hold("generate_closeup");
    let worker = session.clone();
    let running = thread::spawn(move || worker.generate_carousel());
    wait_until("second carousel close-up", || {
        gateway.count("generate_closeup") == 2
    });

    thread::sleep(fast_config().carousel_clear_delay * 2);
    session.inspect(|state| {
        let progress = state
            .carousel_progress
            .clone()
            .unwrap_or_else(|| panic!("running carousel lost its progress"));
        assert_eq!(progress.current, 3);
    });

    let _ = release.send(());
    let outcome = running.join().unwrap_or_else(|_| panic!("carousel worker panicked"));
    assert_eq!(outcome, Outcome::Applied);
    wait_until("progress clear", || {
        session.inspect(|state| state.carousel_progress.is_none())
    });
    Ok(())
}

#[test]
fn close_releases_video_files() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let gateway = ScriptedGateway::new();
    let session = seeded_session(&gateway, temp.path())?;

    session.generate_video(None);
    session.generate_video(None);
    assert_eq!(session.vault().outstanding(), 3);

    session.close();

    assert_eq!(session.vault().outstanding(), 0);
    assert_eq!(std::fs::read_dir(session.vault().dir())?.count(), 0);
    assert!(session.inspect(|state| state.video_history.is_empty()));
    assert!(session
        .events()
        .event_types()
        .iter()
        .any(|event| event == "session_closed"));
    Ok(())
}
