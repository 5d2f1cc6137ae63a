use serde_json::Value;

const RATE_LIMIT_MESSAGE: &str =
    "We're experiencing high traffic right now. Please wait a moment and try again.";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureKind {
    /// Bad user input, rejected before any gateway call.
    InvalidInput,
    /// The generation service failed, blocked the content, or returned junk.
    Gateway,
    /// Something the operation needs is missing (base image, credential).
    Unavailable,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::Gateway => "gateway",
            Self::Unavailable => "unavailable",
        }
    }
}

/// Typed failure carried inside `anyhow::Error` so callers can classify it.
/// Untyped errors count as gateway failures.
#[derive(Debug)]
pub struct SessionFailure {
    kind: FailureKind,
    message: String,
}

impl SessionFailure {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::InvalidInput,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Unavailable,
            message: message.into(),
        }
    }

    pub fn gateway(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Gateway,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }
}

impl std::fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SessionFailure {}

pub fn failure_kind(err: &anyhow::Error) -> FailureKind {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<SessionFailure>())
        .map(SessionFailure::kind)
        .unwrap_or(FailureKind::Gateway)
}

/// Turns any operation failure into the single line shown to the user.
///
/// Input validation messages pass through untouched. Everything else is
/// checked for rate limiting, unwrapped from JSON error bodies, checked for
/// unsupported media types and finally prefixed with `context`.
pub fn friendly_error_message(err: &anyhow::Error, context: &str) -> String {
    if failure_kind(err) == FailureKind::InvalidInput {
        return err.to_string();
    }

    let chain_text = error_chain_text(err, 2048);
    if chain_text.to_ascii_lowercase().contains("rate limit") || chain_text.contains("429") {
        return RATE_LIMIT_MESSAGE.to_string();
    }

    let mut raw = if err.chain().count() > 1 {
        chain_text
    } else {
        err.to_string()
    };
    if let Some(nested) = err
        .chain()
        .find_map(|cause| nested_json_message(&cause.to_string()))
    {
        raw = nested;
    }

    if raw.contains("Unsupported MIME type") {
        let mime = raw
            .split(": ")
            .nth(1)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or("unsupported");
        return format!(
            "File type '{mime}' is not supported. Please use a format like PNG, JPEG, or WEBP."
        );
    }

    format!("{context}. {raw}")
}

/// Pulls `error.message` or `message` out of a JSON body, either the whole
/// text or the part after `API Error: <code> - `.
fn nested_json_message(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let candidate = if trimmed.starts_with('{') {
        trimmed
    } else {
        trimmed
            .split_once(" - ")
            .map(|(_, body)| body.trim())
            .filter(|body| body.starts_with('{'))?
    };
    let parsed: Value = serde_json::from_str(candidate).ok()?;
    parsed
        .get("error")
        .and_then(|error| error.get("message"))
        .and_then(Value::as_str)
        .or_else(|| parsed.get("message").and_then(Value::as_str))
        .map(str::to_string)
}

pub fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
