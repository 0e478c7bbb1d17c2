use serde_json::Value;
use thiserror::Error;

const FALLBACK_MESSAGE: &str = "Convert failed";

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("api error: status={status} {}", api_summary(.detail, .message))]
    Api {
        status: u16,
        detail: Option<String>,
        message: Option<String>,
        payload: Option<Value>,
    },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("job failed: {0}")]
    JobFailed(String),
    #[error("io error: {0}")]
    Io(String),
}

impl ConvertError {
    /// Builds an `Api` error from a non-2xx response body.
    ///
    /// JSON bodies keep their `detail` and `message` fields; anything else is
    /// kept verbatim as a string payload.
    pub fn from_response_body(status: u16, body: &str) -> Self {
        let payload = if body.trim().is_empty() {
            None
        } else {
            Some(
                serde_json::from_str::<Value>(body)
                    .unwrap_or_else(|_| Value::String(body.to_string())),
            )
        };

        let detail = payload.as_ref().and_then(|value| text_field(value, "detail"));
        let message = payload
            .as_ref()
            .and_then(|value| text_field(value, "message"));

        ConvertError::Api {
            status,
            detail,
            message,
            payload,
        }
    }

    /// Text shown to the user when a convert attempt fails.
    ///
    /// Priority: backend `detail`, backend `message`, the stringified backend
    /// payload, the transport error text, then a generic fallback.
    pub fn user_message(&self) -> String {
        match self {
            ConvertError::Api {
                detail,
                message,
                payload,
                ..
            } => non_empty(detail.as_deref())
                .or_else(|| non_empty(message.as_deref()))
                .map(str::to_string)
                .or_else(|| payload.as_ref().and_then(stringify_payload))
                .unwrap_or_else(|| FALLBACK_MESSAGE.to_string()),
            ConvertError::InvalidInput(text)
            | ConvertError::Config(text)
            | ConvertError::Network(text)
            | ConvertError::Timeout(text)
            | ConvertError::Parse(text)
            | ConvertError::JobFailed(text)
            | ConvertError::Io(text) => non_empty(Some(text.as_str()))
                .map(str::to_string)
                .unwrap_or_else(|| FALLBACK_MESSAGE.to_string()),
        }
    }
}

fn api_summary(detail: &Option<String>, message: &Option<String>) -> String {
    detail
        .as_deref()
        .or(message.as_deref())
        .unwrap_or("no detail")
        .to_string()
}

// FastAPI validation errors put a list under `detail`; only plain strings
// count as a human-readable detail.
fn text_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(|text| text.to_string())
}

fn non_empty(text: Option<&str>) -> Option<&str> {
    text.filter(|text| !text.trim().is_empty())
}

fn stringify_payload(payload: &Value) -> Option<String> {
    match payload {
        Value::Null => None,
        Value::String(text) => non_empty(Some(text.as_str())).map(str::to_string),
        other => serde_json::to_string(other).ok(),
    }
}

pub type ConvertResult<T> = Result<T, ConvertError>;
