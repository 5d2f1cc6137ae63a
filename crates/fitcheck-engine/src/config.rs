use std::env;
use std::time::Duration;

use fitcheck_contracts::catalog::DEFAULT_VIDEO_TEMPLATE_ID;

pub const DEFAULT_API_BASE: &str = "https://fit-check-backend-production.up.railway.app";
const DEFAULT_REQUEST_TIMEOUT_S: u64 = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub api_base: String,
    pub request_timeout: Duration,
    /// Appended to video download locators; absence is only fatal at
    /// download time.
    pub download_key: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_S),
            download_key: None,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let api_base = non_empty_env("FITCHECK_API_BASE")
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let timeout_s = non_empty_env("FITCHECK_REQUEST_TIMEOUT")
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_S)
            .clamp(15, 600);
        let download_key = non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("API_KEY"));
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(timeout_s),
            download_key,
        }
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim().trim_end_matches('/').to_string();
        self
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }
}

/// Timing and limits for a session. Tests shrink the durations to
/// milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub video_poll_interval: Duration,
    pub video_poll_timeout: Duration,
    pub loading_message_cycle: Duration,
    pub carousel_clear_delay: Duration,
    pub prompt_history_cap: usize,
    pub default_video_template: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            video_poll_interval: Duration::from_secs(10),
            video_poll_timeout: Duration::from_secs(600),
            loading_message_cycle: Duration::from_secs(4),
            carousel_clear_delay: Duration::from_secs(2),
            prompt_history_cap: 5,
            default_video_template: DEFAULT_VIDEO_TEMPLATE_ID.to_string(),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
