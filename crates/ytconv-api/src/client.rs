use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{CONTENT_DISPOSITION, HeaderMap};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use url::Url;
use ytconv_core::{
    ConversionRequest, ConvertError, ConvertResult, Envelope, Job, JobTicket, VideoMetadata,
};

pub const API_PREFIX: &str = "api";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const USER_AGENT: &str = "ytconv/0.1";

/// HTTP adapter for the conversion backend.
///
/// Every call goes to `<base>/api/...` with a fixed timeout. Nothing is
/// retried or cached; errors are handed back to the caller as-is.
///
/// File downloads use a second client without a whole-request deadline: the
/// timeout only bounds connecting and each gap between body reads, so large
/// files are not cut off while bytes keep arriving.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    transfer: Client,
    base: Url,
    base_url: String,
}

impl ApiClient {
    pub fn try_new(base_url: impl Into<String>, timeout: Duration) -> ConvertResult<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        let base = Url::parse(&base_url)
            .map_err(|err| ConvertError::Config(format!("invalid api base url: {err}")))?;
        if base.cannot_be_a_base() {
            return Err(ConvertError::Config(format!(
                "invalid api base url: {base_url}"
            )));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|err| ConvertError::Config(format!("failed to build http client: {err}")))?;
        let transfer = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|err| ConvertError::Config(format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            transfer,
            base,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn parse(&self, url: &str) -> ConvertResult<VideoMetadata> {
        tracing::debug!(%url, "parsing video");
        let response = self
            .client
            .post(self.endpoint(&["youtube", "parse"]))
            .json(&ParseBody { url })
            .send()
            .await
            .map_err(|err| transport_error("parse", err))?;
        read_envelope(response, "parse").await
    }

    pub async fn create_job(&self, request: &ConversionRequest) -> ConvertResult<JobTicket> {
        tracing::debug!(url = %request.url(), kind = %request.output_type(), "creating job");
        let response = self
            .client
            .post(self.endpoint(&["youtube", "jobs"]))
            .json(request)
            .send()
            .await
            .map_err(|err| transport_error("create job", err))?;
        read_envelope(response, "create job").await
    }

    pub async fn get_job(&self, job_id: &str) -> ConvertResult<Job> {
        let response = self
            .client
            .get(self.endpoint(&["youtube", "jobs", job_id]))
            .send()
            .await
            .map_err(|err| transport_error("job status", err))?;
        read_envelope(response, "job status").await
    }

    /// Checks that the backend can reach its queue.
    pub async fn ping(&self) -> ConvertResult<bool> {
        let response = self
            .client
            .get(self.endpoint(&["queue", "ping"]))
            .send()
            .await
            .map_err(|err| transport_error("ping", err))?;
        let response = check_status(response).await?;
        let payload = response
            .json::<PingResponse>()
            .await
            .map_err(|err| ConvertError::Parse(format!("ping response parse failed: {err}")))?;
        Ok(payload.success.unwrap_or(false) && payload.redis_ping.unwrap_or(false))
    }

    /// Link to the converted file. Only finished jobs have one.
    pub fn download_url(&self, job: &Job) -> Option<String> {
        if !job.is_finished() {
            return None;
        }
        job.download_url
            .as_deref()
            .map(|path| format!("{}{}", self.base_url, path))
    }

    /// Streams the converted file of a finished job into `dir`.
    ///
    /// The file name comes from the response's `Content-Disposition`, then the
    /// job's `filename`, then the last segment of the link. Bytes land in a
    /// `.part` file that is renamed once the body is complete and removed if
    /// the transfer fails.
    pub async fn download(&self, job: &Job, dir: &Path) -> ConvertResult<PathBuf> {
        let link = self.download_url(job).ok_or_else(|| {
            ConvertError::InvalidInput(format!(
                "job has no download yet (status: {})",
                job.status
            ))
        })?;
        tracing::info!(%link, "downloading converted file");

        let response = self
            .transfer
            .get(&link)
            .send()
            .await
            .map_err(|err| transport_error("download", err))?;
        let response = check_status(response).await?;

        let name = content_disposition_name(response.headers())
            .unwrap_or_else(|| download_file_name(job));
        let target = dir.join(&name);
        let partial = dir.join(format!("{name}.part"));

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|err| ConvertError::Io(format!("failed to create {}: {err}", dir.display())))?;

        let written = match write_body(response, &partial).await {
            Ok(written) => written,
            Err(err) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    tracing::warn!(path = %partial.display(), %cleanup, "failed to remove partial download");
                }
                return Err(err);
            }
        };
        tokio::fs::rename(&partial, &target).await.map_err(|err| {
            ConvertError::Io(format!("failed to move {}: {err}", target.display()))
        })?;

        tracing::debug!(bytes = written, path = %target.display(), "download complete");
        Ok(target)
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // `try_new` rejects cannot-be-a-base URLs, so the segments are always editable.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push(API_PREFIX).extend(segments);
        }
        url
    }
}

#[derive(serde::Serialize)]
struct ParseBody<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct PingResponse {
    success: Option<bool>,
    redis_ping: Option<bool>,
}

fn transport_error(action: &str, err: reqwest::Error) -> ConvertError {
    if err.is_timeout() {
        ConvertError::Timeout(format!("{action} request timed out: {err}"))
    } else {
        ConvertError::Network(format!("{action} request failed: {err}"))
    }
}

async fn check_status(response: Response) -> ConvertResult<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    tracing::debug!(%status, %body, "backend returned an error");
    Err(ConvertError::from_response_body(status.as_u16(), &body))
}

async fn read_envelope<T: DeserializeOwned>(response: Response, action: &str) -> ConvertResult<T> {
    let response = check_status(response).await?;
    let envelope = response
        .json::<Envelope<T>>()
        .await
        .map_err(|err| ConvertError::Parse(format!("{action} response parse failed: {err}")))?;
    Ok(envelope.data)
}

async fn write_body(response: Response, path: &Path) -> ConvertResult<u64> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|err| ConvertError::Io(format!("failed to create {}: {err}", path.display())))?;

    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| transport_error("download", err))?;
        file.write_all(&chunk)
            .await
            .map_err(|err| ConvertError::Io(format!("failed to write file: {err}")))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|err| ConvertError::Io(format!("failed to write file: {err}")))?;
    Ok(written)
}

// `filename*=UTF-8''...` wins over the plain `filename=` parameter.
fn content_disposition_name(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;
    let mut plain = None;
    let mut extended = None;
    for param in value.split(';').skip(1) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        let raw = raw.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = raw.rsplit_once('\'').map_or(raw, |(_, encoded)| encoded);
                extended = urlencoding::decode(encoded.trim_matches('"'))
                    .ok()
                    .map(|name| name.into_owned());
            }
            "filename" => plain = Some(raw.trim_matches('"').to_string()),
            _ => {}
        }
    }
    extended.or(plain).as_deref().and_then(last_component)
}

fn download_file_name(job: &Job) -> String {
    let from_filename = job.filename.as_deref().and_then(last_component);
    let from_link = job
        .download_url
        .as_deref()
        .and_then(|link| link.split(['?', '#']).next())
        .and_then(|path| path.rsplit('/').next())
        .and_then(last_component);

    from_filename.or(from_link).unwrap_or_else(|| {
        format!("{}.bin", job.job_id.as_deref().unwrap_or("download"))
    })
}

// Strips any directory part the backend may have sent.
fn last_component(name: &str) -> Option<String> {
    Path::new(name.trim())
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ApiClient {
        ApiClient::try_new(base, DEFAULT_TIMEOUT).unwrap()
    }

    #[test]
    fn endpoints_live_under_api_prefix() {
        let api = client("http://127.0.0.1:8000/");
        assert_eq!(
            api.endpoint(&["youtube", "parse"]).as_str(),
            "http://127.0.0.1:8000/api/youtube/parse"
        );
        assert_eq!(
            api.endpoint(&["youtube", "jobs", "a b/c"]).as_str(),
            "http://127.0.0.1:8000/api/youtube/jobs/a%20b%2Fc"
        );
    }

    #[test]
    fn endpoints_keep_base_path() {
        let api = client("https://media.example.com/converter");
        assert_eq!(
            api.endpoint(&["youtube", "jobs"]).as_str(),
            "https://media.example.com/converter/api/youtube/jobs"
        );
    }

    #[test]
    fn rejects_unusable_base_url() {
        assert!(matches!(
            ApiClient::try_new("not a url", DEFAULT_TIMEOUT),
            Err(ConvertError::Config(_))
        ));
        assert!(matches!(
            ApiClient::try_new("mailto:someone@example.com", DEFAULT_TIMEOUT),
            Err(ConvertError::Config(_))
        ));
    }

    #[test]
    fn download_url_only_for_finished_jobs() {
        let api = client("http://127.0.0.1:8000");
        let mut job = Job {
            status: "processing".to_string(),
            download_url: Some("/files/abc.mp3".to_string()),
            ..Job::default()
        };
        assert_eq!(api.download_url(&job), None);

        job.status = "finished".to_string();
        assert_eq!(
            api.download_url(&job).as_deref(),
            Some("http://127.0.0.1:8000/files/abc.mp3")
        );

        job.download_url = None;
        assert_eq!(api.download_url(&job), None);
    }

    #[test]
    fn file_name_prefers_backend_filename() {
        let job = Job {
            job_id: Some("j1".to_string()),
            filename: Some("../../etc/My Song.mp3".to_string()),
            download_url: Some("/api/youtube/download/j1".to_string()),
            ..Job::default()
        };
        assert_eq!(download_file_name(&job), "My Song.mp3");

        let job = Job {
            filename: None,
            download_url: Some("/files/abc.mp3?token=x".to_string()),
            ..job
        };
        assert_eq!(download_file_name(&job), "abc.mp3");

        let job = Job {
            download_url: None,
            ..job
        };
        assert_eq!(download_file_name(&job), "j1.bin");
    }

    fn disposition(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_DISPOSITION, value.parse().unwrap());
        headers
    }

    #[test]
    fn content_disposition_names_the_file() {
        assert_eq!(
            content_disposition_name(&disposition(r#"attachment; filename="My Song.mp3""#))
                .as_deref(),
            Some("My Song.mp3")
        );
        assert_eq!(
            content_disposition_name(&disposition(
                r#"attachment; filename="fallback.mp3"; filename*=utf-8''Caf%C3%A9%20Live.mp4"#
            ))
            .as_deref(),
            Some("Café Live.mp4")
        );
        assert_eq!(
            content_disposition_name(&disposition("attachment; filename=../../tmp/x.mp3"))
                .as_deref(),
            Some("x.mp3")
        );
        assert_eq!(content_disposition_name(&disposition("inline")), None);
        assert_eq!(content_disposition_name(&HeaderMap::new()), None);
    }
}
