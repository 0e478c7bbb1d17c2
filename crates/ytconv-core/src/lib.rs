mod error;
mod model;

pub use error::{ConvertError, ConvertResult};
pub use model::{
    Bitrate, ConversionRequest, Envelope, FormatOption, Job, JobTicket, OutputType,
    QualityPolicy, STATUS_FAILED, STATUS_FINISHED, VideoMetadata,
};

const YOUTUBE_HOSTS: [&str; 4] = ["www.youtube.com", "youtube.com", "m.youtube.com", "youtu.be"];

/// Rejects input that is not an absolute `http`/`https` URL with a host.
pub fn validate_url(url: &str) -> ConvertResult<()> {
    let parsed = url::Url::parse(url.trim())
        .map_err(|err| ConvertError::InvalidInput(format!("invalid url: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ConvertError::InvalidInput(format!(
            "invalid url: {url} is not a web link"
        )));
    }
    Ok(())
}

/// Whether the backend's host allow-list would accept this URL.
pub fn is_allowed_youtube_url(url: &str) -> bool {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_lowercase))
        .is_some_and(|host| YOUTUBE_HOSTS.contains(&host.as_str()))
}
