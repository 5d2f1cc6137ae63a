//! Writes a session's gallery to disk: every image in the flat history,
//! the layered outfit history and a summary.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fitcheck_contracts::outfit::OutfitHistory;
use fitcheck_contracts::summary::{now_utc_iso, write_summary, SessionSummary};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Map, Value};

use crate::config::GatewayConfig;
use crate::session::TryOnSession;
use crate::upload::{decode_data_url, UploadFile};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpeg", "jpg", "png", "webp"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub dir: PathBuf,
    pub images: Vec<PathBuf>,
    pub outfit_path: PathBuf,
    pub summary_path: PathBuf,
}

struct GallerySnapshot {
    images: Vec<String>,
    history: OutfitHistory,
    worn_garments: Vec<String>,
    total_videos: u64,
    post_copy: Option<String>,
}

pub fn export_gallery(session: &TryOnSession, dir: &Path) -> Result<ExportReport> {
    let snapshot = session.inspect(|state| GallerySnapshot {
        images: state.generation_history.clone(),
        history: state.history.clone(),
        worn_garments: state
            .history
            .active_slice(state.current_outfit_index)
            .iter()
            .filter_map(|layer| layer.garment.as_ref().map(|garment| garment.name.clone()))
            .collect(),
        total_videos: state.video_history.len() as u64,
        post_copy: state.post_copy.clone(),
    });
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let mut http: Option<HttpClient> = None;
    let mut images = Vec::with_capacity(snapshot.images.len());
    for (index, url) in snapshot.images.iter().enumerate() {
        let bytes = if url.starts_with("data:") {
            decode_data_url(url)?.1
        } else {
            let client = match http.take() {
                Some(client) => client,
                None => HttpClient::builder()
                    .timeout(GatewayConfig::default().request_timeout)
                    .build()
                    .context("failed to build download client")?,
            };
            let file = UploadFile::fetch(&client, url, "gallery-image");
            http = Some(client);
            file?.bytes
        };
        let path = dir.join(format!("outfit-story-{}.{}", index + 1, image_extension(url)));
        fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
        images.push(path);
    }

    let outfit_path = dir.join("outfit.json");
    snapshot.history.save(&outfit_path)?;

    let summary_path = dir.join("summary.json");
    let summary = SessionSummary {
        session_id: session.session_id().to_string(),
        started_at: session.started_at().to_string(),
        finished_at: now_utc_iso(),
        total_layers: snapshot.history.len() as u64,
        total_images: images.len() as u64,
        total_videos: snapshot.total_videos,
        worn_garments: snapshot.worn_garments,
        post_copy: snapshot.post_copy,
    };
    let mut extra = Map::new();
    extra.insert(
        "export_dir".to_string(),
        Value::String(dir.to_string_lossy().to_string()),
    );
    write_summary(&summary_path, &summary, Some(&extra))?;

    let _ = session.events().emit_json(
        "gallery_exported",
        json!({
            "dir": dir.to_string_lossy().to_string(),
            "images": images.len(),
        }),
    );

    Ok(ExportReport {
        dir: dir.to_path_buf(),
        images,
        outfit_path,
        summary_path,
    })
}

/// File extension for a gallery image: the data URL's subtype, else the
/// first known extension in the URL, else `png`.
fn image_extension(url: &str) -> &'static str {
    let lowered = url.to_ascii_lowercase();
    if let Some(rest) = lowered.strip_prefix("data:image/") {
        let subtype = rest.split([';', ',']).next().unwrap_or_default();
        return IMAGE_EXTENSIONS
            .iter()
            .find(|ext| **ext == subtype)
            .copied()
            .unwrap_or("png");
    }
    IMAGE_EXTENSIONS
        .iter()
        .find(|ext| lowered.contains(&format!(".{ext}")))
        .copied()
        .unwrap_or("png")
}
