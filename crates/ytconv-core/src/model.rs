use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ConvertError, ConvertResult};

pub const STATUS_FINISHED: &str = "finished";
pub const STATUS_FAILED: &str = "failed";

/// Response wrapper used by every backend route.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    pub data: T,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatOption {
    pub label: String,
    #[serde(rename = "hasAudio", default, deserialize_with = "null_as_default")]
    pub has_audio: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itag: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcodec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acodec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesize: Option<u64>,
}

impl FormatOption {
    pub fn new(label: impl Into<String>, has_audio: bool) -> Self {
        Self {
            label: label.into(),
            has_audio,
            itag: None,
            ext: None,
            vcodec: None,
            acodec: None,
            filesize: None,
        }
    }

    /// Vertical resolution encoded in labels such as `720p` or `1080p60`.
    pub fn height(&self) -> Option<u32> {
        let digits: String = self
            .label
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub formats: BTreeMap<String, Vec<FormatOption>>,
}

impl VideoMetadata {
    pub fn mp4_options(&self) -> &[FormatOption] {
        self.formats
            .get(OutputType::Mp4.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    #[default]
    Mp3,
    Mp4,
}

impl OutputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputType::Mp3 => "mp3",
            OutputType::Mp4 => "mp4",
        }
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputType {
    type Err = ConvertError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "mp3" | "audio" => Ok(OutputType::Mp3),
            "mp4" | "video" => Ok(OutputType::Mp4),
            other => Err(ConvertError::InvalidInput(format!(
                "unknown format: {other} (expected mp3 or mp4)"
            ))),
        }
    }
}

/// Audio bitrate in kbps. Only the values the backend encodes are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Bitrate(u32);

impl Bitrate {
    pub const SUPPORTED: [u32; 3] = [128, 192, 320];

    pub fn new(kbps: u32) -> ConvertResult<Self> {
        if Self::SUPPORTED.contains(&kbps) {
            Ok(Self(kbps))
        } else {
            Err(ConvertError::InvalidInput(format!(
                "unsupported bitrate: {kbps} (expected one of 128, 192, 320)"
            )))
        }
    }

    pub fn kbps(&self) -> u32 {
        self.0
    }
}

impl Default for Bitrate {
    fn default() -> Self {
        Self(192)
    }
}

impl TryFrom<u32> for Bitrate {
    type Error = ConvertError;

    fn try_from(kbps: u32) -> Result<Self, Self::Error> {
        Bitrate::new(kbps)
    }
}

impl From<Bitrate> for u32 {
    fn from(bitrate: Bitrate) -> Self {
        bitrate.0
    }
}

impl FromStr for Bitrate {
    type Err = ConvertError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim().trim_end_matches("kbps").trim();
        let kbps = trimmed
            .parse::<u32>()
            .map_err(|_| ConvertError::InvalidInput(format!("invalid bitrate: {input}")))?;
        Bitrate::new(kbps)
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the mp4 quality is picked from the parsed format list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QualityPolicy {
    /// Last entry of the list; the backend lists formats in ascending order.
    #[default]
    Last,
    /// Largest height parsed from the labels, falling back to `Last`.
    Highest,
}

impl QualityPolicy {
    pub fn pick<'a>(&self, options: &'a [FormatOption]) -> Option<&'a FormatOption> {
        match self {
            QualityPolicy::Last => options.last(),
            QualityPolicy::Highest => options
                .iter()
                .filter_map(|option| option.height().map(|height| (height, option)))
                .max_by_key(|(height, _)| *height)
                .map(|(_, option)| option)
                .or_else(|| options.last()),
        }
    }
}

impl FromStr for QualityPolicy {
    type Err = ConvertError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "last" => Ok(QualityPolicy::Last),
            "highest" => Ok(QualityPolicy::Highest),
            other => Err(ConvertError::InvalidInput(format!(
                "unknown quality policy: {other} (expected last or highest)"
            ))),
        }
    }
}

/// Body of the create-job call. Built fresh for every convert.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ConversionRequest {
    #[serde(rename = "mp4")]
    Video { url: String, quality: String },
    #[serde(rename = "mp3")]
    Audio { url: String, bitrate: Bitrate },
}

impl ConversionRequest {
    pub fn url(&self) -> &str {
        match self {
            ConversionRequest::Video { url, .. } | ConversionRequest::Audio { url, .. } => url,
        }
    }

    pub fn output_type(&self) -> OutputType {
        match self {
            ConversionRequest::Video { .. } => OutputType::Mp4,
            ConversionRequest::Audio { .. } => OutputType::Mp3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobTicket {
    #[serde(rename = "jobId")]
    pub job_id: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Status snapshot of a server-side job. Replaced wholesale on every poll.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "jobId", default)]
    pub job_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(rename = "downloadUrl", default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Job {
    pub fn is_finished(&self) -> bool {
        self.status == STATUS_FINISHED
    }

    pub fn is_failed(&self) -> bool {
        self.status == STATUS_FAILED
    }

    pub fn is_terminal(&self) -> bool {
        self.is_finished() || self.is_failed()
    }
}

// The backend sends `null` for unknown optional flags.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
