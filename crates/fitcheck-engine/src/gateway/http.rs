use anyhow::{bail, Context, Result};
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};

use super::{GenerationGateway, PostCopyRequest, VideoJob, VideoJobOutcome};
use crate::config::GatewayConfig;
use crate::errors::{truncate_text, SessionFailure};
use crate::upload::UploadFile;

pub const MISSING_DOWNLOAD_KEY_MESSAGE: &str = "API_KEY is not available to download the video.";

/// Blocking client for the fit-check backend's `/api/ai/*` endpoints.
pub struct HttpGateway {
    config: GatewayConfig,
    http: HttpClient,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn client(&self) -> &HttpClient {
        &self.http
    }

    fn post_json(&self, path: &str, body: Value) -> Result<ApiResponse> {
        let endpoint = self.config.endpoint(path);
        let response = self
            .http
            .post(&endpoint)
            .json(&body)
            .send()
            .with_context(|| format!("request failed ({endpoint})"))?;
        api_response(response)
    }

    fn post_form(&self, path: &str, form: MultipartForm) -> Result<ApiResponse> {
        let endpoint = self.config.endpoint(path);
        let response = self
            .http
            .post(&endpoint)
            .multipart(form)
            .send()
            .with_context(|| format!("request failed ({endpoint})"))?;
        api_response(response)
    }

    fn image_from_json(&self, path: &str, body: Value) -> Result<String> {
        self.post_json(path, body)?.into_field("imageUrl")
    }

    fn image_from_form(&self, path: &str, form: MultipartForm) -> Result<String> {
        self.post_form(path, form)?.into_field("imageUrl")
    }
}

impl GenerationGateway for HttpGateway {
    fn name(&self) -> &str {
        "http"
    }

    fn generate_model(&self, photo: &UploadFile) -> Result<String> {
        let form = MultipartForm::new().part("image", file_part(photo)?);
        self.image_from_form("/api/ai/generate-model", form)
    }

    fn composite_garment(&self, base_image: &str, garment: &UploadFile) -> Result<String> {
        let form = MultipartForm::new()
            .part("garment", file_part(garment)?)
            .text("modelImageUrl", base_image.to_string());
        self.image_from_form("/api/ai/virtual-tryon", form)
    }

    fn variate_pose(&self, source_image: &str, pose_instruction: &str) -> Result<String> {
        self.image_from_json(
            "/api/ai/generate-pose",
            json!({
                "imageUrl": source_image,
                "poseInstruction": pose_instruction,
            }),
        )
    }

    fn generate_background(&self, base_image: &str, prompt: &str) -> Result<String> {
        self.image_from_json(
            "/api/ai/generate-background",
            json!({
                "modelImageUrl": base_image,
                "backgroundPrompt": prompt,
            }),
        )
    }

    fn replace_background(&self, base_image: &str, background: &UploadFile) -> Result<String> {
        let form = MultipartForm::new()
            .part("backgroundImage", file_part(background)?)
            .text("modelImageUrl", base_image.to_string());
        self.image_from_form("/api/ai/replace-background", form)
    }

    fn generate_closeup(&self, base_image: &str, outfit_description: &str) -> Result<String> {
        self.image_from_json(
            "/api/ai/generate-closeup",
            json!({
                "imageUrl": base_image,
                "outfitDescription": outfit_description,
            }),
        )
    }

    fn generate_post_copy(&self, request: &PostCopyRequest) -> Result<String> {
        self.post_json(
            "/api/ai/generate-post-copy",
            json!({
                "imageUrl": request.image,
                "outfitDescription": request.outfit_description,
                "sceneDescription": request.scene_description,
                "brandName": request.brand_name.clone().unwrap_or_default(),
            }),
        )?
        .into_field("postCopy")
    }

    fn submit_video_job(&self, image: &str, template_id: Option<&str>) -> Result<VideoJob> {
        let response = self.post_json(
            "/api/ai/generate-video",
            json!({
                "imageUrl": image,
                "templateId": template_id.unwrap_or("runway-walk"),
            }),
        )?;
        parse_video_job(&response.into_json("video job")?)
    }

    fn poll_video_job(&self, job: &VideoJob) -> Result<VideoJob> {
        let endpoint = self
            .config
            .endpoint(&format!("/api/ai/video-status/{}", job.id));
        let response = self
            .http
            .get(&endpoint)
            .send()
            .with_context(|| format!("request failed ({endpoint})"))?;
        let mut polled = parse_video_job(&api_response(response)?.into_json("video status")?)?;
        if polled.id.is_empty() {
            polled.id = job.id.clone();
        }
        Ok(polled)
    }

    fn fetch_video_bytes(&self, locator: &str) -> Result<Vec<u8>> {
        let Some(key) = self.config.download_key.as_deref() else {
            return Err(SessionFailure::unavailable(MISSING_DOWNLOAD_KEY_MESSAGE).into());
        };
        let url = keyed_download_url(locator, key);
        let response = self
            .http
            .get(&url)
            .send()
            .context("video download request failed")?;
        let status = response.status();
        if !status.is_success() {
            bail!("Failed to download video: {}", status.as_u16());
        }
        Ok(response
            .bytes()
            .context("failed reading video bytes")?
            .to_vec())
    }
}

/// A successful body: JSON when the server says so, raw text otherwise.
enum ApiResponse {
    Json(Value),
    Text(String),
}

impl ApiResponse {
    /// `body[field]` when it is a non-empty string, else the raw text.
    fn into_field(self, field: &str) -> Result<String> {
        match self {
            Self::Json(value) => value
                .get(field)
                .and_then(Value::as_str)
                .filter(|text| !text.trim().is_empty())
                .map(str::to_string)
                .or_else(|| value.as_str().map(str::to_string))
                .ok_or_else(|| {
                    SessionFailure::gateway(format!(
                        "response is missing '{field}': {}",
                        truncate_text(&value.to_string(), 256)
                    ))
                    .into()
                }),
            Self::Text(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            Self::Text(_) => bail!("response body was empty"),
        }
    }

    fn into_json(self, what: &str) -> Result<Value> {
        match self {
            Self::Json(value) => Ok(value),
            Self::Text(text) => serde_json::from_str(&text)
                .with_context(|| format!("{what} returned invalid JSON payload")),
        }
    }
}

fn api_response(response: HttpResponse) -> Result<ApiResponse> {
    let status = response.status();
    let is_json = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.contains("application/json"))
        .unwrap_or(false);
    let body = response.text().context("response body read failed")?;
    if !status.is_success() {
        bail!("API Error: {} - {}", status.as_u16(), body);
    }
    if is_json {
        let parsed: Value =
            serde_json::from_str(&body).context("backend returned invalid JSON payload")?;
        return Ok(ApiResponse::Json(parsed));
    }
    Ok(ApiResponse::Text(body))
}

fn file_part(upload: &UploadFile) -> Result<MultipartPart> {
    MultipartPart::bytes(upload.bytes.clone())
        .file_name(upload.name.clone())
        .mime_str(&upload.mime)
        .with_context(|| format!("invalid mime '{}' for {}", upload.mime, upload.name))
}

/// Reads an operation payload. An explicit error wins over a block reason,
/// which wins over a result.
pub(crate) fn parse_video_job(payload: &Value) -> Result<VideoJob> {
    let id = payload
        .get("id")
        .or_else(|| payload.get("name"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let done = payload.get("done").and_then(Value::as_bool).unwrap_or(false);
    if !done {
        return Ok(VideoJob::pending(id));
    }

    if let Some(error) = payload.get("error").filter(|value| !value.is_null()) {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Ok(VideoJob::finished(id, VideoJobOutcome::Failed { message }));
    }

    let response = payload.get("response");
    let feedback = response.and_then(|value| value.get("promptFeedback"));
    if let Some(reason) = feedback
        .and_then(|value| value.get("blockReason"))
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
    {
        let message = feedback
            .and_then(|value| value.get("blockReasonMessage"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Ok(VideoJob::finished(
            id,
            VideoJobOutcome::Blocked {
                reason: reason.to_string(),
                message,
            },
        ));
    }

    let uri = response
        .and_then(|value| value.get("generatedVideos"))
        .and_then(|value| value.get(0))
        .and_then(|value| value.get("video"))
        .and_then(|value| value.get("uri"))
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty());
    let outcome = match uri {
        Some(uri) => VideoJobOutcome::Ready {
            uri: uri.to_string(),
        },
        None => VideoJobOutcome::Empty,
    };
    Ok(VideoJob::finished(id, outcome))
}

fn keyed_download_url(locator: &str, key: &str) -> String {
    let separator = if locator.contains('?') { '&' } else { '?' };
    format!("{locator}{separator}key={key}")
}
