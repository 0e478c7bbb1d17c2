//! Scripted backend for workflow and poller tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use ytconv_api::JobBackend;
use ytconv_core::{
    ConversionRequest, ConvertError, ConvertResult, FormatOption, Job, JobTicket, VideoMetadata,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Parse(String),
    CreateJob(ConversionRequest),
    GetJob(String),
}

/// Backend double with canned answers.
///
/// Job statuses are consumed in order; `None` makes that fetch fail. Once the
/// script runs out every fetch reports `processing`.
#[derive(Default)]
pub struct ScriptedBackend {
    pub formats: Mutex<Vec<FormatOption>>,
    pub parse_error: Mutex<Option<String>>,
    pub create_error: Mutex<Option<String>>,
    parse_gate: Mutex<Option<Arc<Notify>>>,
    statuses: Mutex<VecDeque<Option<&'static str>>>,
    calls: Mutex<Vec<(Call, Instant)>>,
    next_job: AtomicUsize,
}

impl ScriptedBackend {
    pub fn with_formats(labels: &[&str]) -> Self {
        let backend = Self::default();
        *backend.formats.lock().unwrap() = labels
            .iter()
            .map(|label| FormatOption::new(*label, true))
            .collect();
        backend
    }

    pub fn script_statuses(&self, statuses: impl IntoIterator<Item = Option<&'static str>>) {
        self.statuses.lock().unwrap().extend(statuses);
    }

    /// Makes the next `parse` wait until the returned handle is notified.
    pub fn hold_parse(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.parse_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn fail_parse(&self, detail: &str) {
        *self.parse_error.lock().unwrap() = Some(detail.to_string());
    }

    pub fn fail_create(&self, detail: &str) {
        *self.create_error.lock().unwrap() = Some(detail.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(call, _)| call.clone())
            .collect()
    }

    pub fn get_times(&self) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(call, _)| matches!(call, Call::GetJob(_)))
            .map(|(_, at)| *at)
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push((call, Instant::now()));
    }
}

fn rejection(detail: &str) -> ConvertError {
    ConvertError::from_response_body(400, &format!(r#"{{"detail":"{detail}"}}"#))
}

#[async_trait]
impl JobBackend for ScriptedBackend {
    async fn parse(&self, url: &str) -> ConvertResult<VideoMetadata> {
        self.record(Call::Parse(url.to_string()));
        let gate = self.parse_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(detail) = self.parse_error.lock().unwrap().as_deref() {
            return Err(rejection(detail));
        }
        let mut formats = std::collections::BTreeMap::new();
        formats.insert("mp4".to_string(), self.formats.lock().unwrap().clone());
        Ok(VideoMetadata {
            id: Some("abc".to_string()),
            title: "Example video".to_string(),
            thumbnail: None,
            channel: Some("Example channel".to_string()),
            duration: Some(212),
            formats,
        })
    }

    async fn create_job(&self, request: &ConversionRequest) -> ConvertResult<JobTicket> {
        self.record(Call::CreateJob(request.clone()));
        if let Some(detail) = self.create_error.lock().unwrap().as_deref() {
            return Err(rejection(detail));
        }
        let number = self.next_job.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(JobTicket {
            job_id: format!("job-{number}"),
            status: Some("queued".to_string()),
        })
    }

    async fn get_job(&self, job_id: &str) -> ConvertResult<Job> {
        self.record(Call::GetJob(job_id.to_string()));
        let next = self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Some("processing"));
        let Some(status) = next else {
            return Err(ConvertError::Network("backend unavailable".to_string()));
        };
        let finished = status == "finished";
        Ok(Job {
            job_id: Some(job_id.to_string()),
            status: status.to_string(),
            stage: Some(if finished { "done" } else { "downloading" }.to_string()),
            progress: Some(if finished { 100 } else { 40 }),
            download_url: finished.then(|| format!("/files/{job_id}.mp3")),
            filename: None,
            error: (status == "failed").then(|| "yt-dlp exited with 1".to_string()),
        })
    }
}
