use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::Client as HttpClient;

use crate::errors::SessionFailure;

pub const NOT_AN_IMAGE_MESSAGE: &str = "Please select an image file.";

/// A user-provided file headed for the gateway: model photo, garment or
/// background.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or("upload")
            .to_string();
        let mime = mime_for_path(path).unwrap_or("application/octet-stream");
        Ok(Self::new(name, mime, bytes))
    }

    /// Loads a `data:` URL or downloads an http(s) location.
    pub fn fetch(http: &HttpClient, url: &str, name: &str) -> Result<Self> {
        if url.starts_with("data:") {
            let (mime, bytes) = decode_data_url(url)?;
            return Ok(Self::new(name, mime, bytes));
        }
        let response = http
            .get(url)
            .send()
            .with_context(|| format!("download failed ({url})"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("download failed ({}): {url}", status.as_u16());
        }
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let bytes = response
            .bytes()
            .with_context(|| format!("failed reading body of {url}"))?
            .to_vec();
        Ok(Self::new(name, mime, bytes))
    }

    pub fn is_image(&self) -> bool {
        self.mime.to_ascii_lowercase().starts_with("image/")
            && image::guess_format(&self.bytes).is_ok()
    }

    /// Rejects anything that is not an image before it reaches the gateway.
    pub fn ensure_image(&self) -> Result<()> {
        if self.is_image() {
            return Ok(());
        }
        Err(SessionFailure::invalid_input(NOT_AN_IMAGE_MESSAGE).into())
    }

    pub fn to_data_url(&self) -> String {
        data_url(&self.mime, &self.bytes)
    }
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "mp4" => Some("video/mp4"),
        _ => None,
    }
}

pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", BASE64.encode(bytes))
}

/// Splits `data:<mime>;base64,<payload>` into mime and decoded bytes.
pub fn decode_data_url(url: &str) -> Result<(String, Vec<u8>)> {
    let Some(rest) = url.strip_prefix("data:") else {
        bail!("not a data URL");
    };
    let Some((header, payload)) = rest.split_once(',') else {
        bail!("malformed data URL");
    };
    let Some(mime) = header.strip_suffix(";base64") else {
        bail!("data URL is not base64 encoded");
    };
    let bytes = BASE64
        .decode(payload.trim())
        .context("data URL payload is not valid base64")?;
    Ok((mime.to_string(), bytes))
}
