use std::sync::Arc;

use tokio::sync::watch;
use ytconv_api::JobBackend;
use ytconv_core::{
    Bitrate, ConversionRequest, ConvertResult, Job, OutputType, QualityPolicy, VideoMetadata,
};

use crate::poller::{JobPoller, PollSettings};
use crate::view::JobView;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSelection {
    pub output_type: OutputType,
    pub quality: String,
    pub bitrate: Bitrate,
}

impl Default for OutputSelection {
    fn default() -> Self {
        Self {
            output_type: OutputType::Mp3,
            quality: "720p".to_string(),
            bitrate: Bitrate::default(),
        }
    }
}

/// Which backend calls a convert attempt still has in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusyState {
    pub parsing: bool,
    pub creating: bool,
}

impl BusyState {
    pub fn is_busy(&self) -> bool {
        self.parsing || self.creating
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    /// Prefix for download links; no trailing slash.
    pub base_url: String,
    pub poll: PollSettings,
    pub quality_policy: QualityPolicy,
}

/// Drives one conversion at a time: parse, create the job, then poll it.
///
/// Starting a new conversion discards everything about the previous one,
/// including its poller.
pub struct Workflow<B: JobBackend + ?Sized + 'static> {
    backend: Arc<B>,
    settings: WorkflowSettings,
    url: String,
    selection: OutputSelection,
    video: Option<VideoMetadata>,
    poller: Option<JobPoller>,
    busy: watch::Sender<BusyState>,
}

impl<B: JobBackend + ?Sized + 'static> Workflow<B> {
    pub fn new(backend: Arc<B>, settings: WorkflowSettings, selection: OutputSelection) -> Self {
        Self {
            backend,
            settings,
            url: String::new(),
            selection,
            video: None,
            poller: None,
            busy: watch::Sender::new(BusyState::default()),
        }
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    pub fn selection(&self) -> &OutputSelection {
        &self.selection
    }

    pub fn video(&self) -> Option<&VideoMetadata> {
        self.video.as_ref()
    }

    pub fn job_id(&self) -> Option<&str> {
        self.poller.as_ref().map(JobPoller::job_id)
    }

    pub fn job(&self) -> Option<Job> {
        self.poller.as_ref().and_then(JobPoller::job)
    }

    pub fn poller_mut(&mut self) -> Option<&mut JobPoller> {
        self.poller.as_mut()
    }

    pub fn busy(&self) -> BusyState {
        *self.busy.borrow()
    }

    /// Follows the busy flags while a `convert` call is running.
    pub fn subscribe_busy(&self) -> watch::Receiver<BusyState> {
        self.busy.subscribe()
    }

    /// Derived presentation values; `None` until a job exists.
    pub fn view(&self) -> Option<JobView> {
        let poller = self.poller.as_ref()?;
        let job = poller.job();
        Some(JobView::new(
            poller.job_id(),
            job.as_ref(),
            &self.settings.base_url,
        ))
    }

    /// Parses the current URL, creates a job for it and starts polling.
    ///
    /// Leading and trailing whitespace is trimmed from the URL before it is
    /// sent to the backend. Returns `Ok(None)` without touching the backend when the URL is blank.
    /// On error no job is tracked; `ConvertError::user_message` gives the text
    /// to show.
    pub async fn convert(&mut self) -> ConvertResult<Option<String>> {
        let url = self.url.trim().to_string();
        if url.is_empty() {
            return Ok(None);
        }

        self.busy.send_replace(BusyState {
            parsing: true,
            creating: true,
        });
        self.video = None;
        if let Some(previous) = self.poller.take() {
            tracing::debug!(job_id = %previous.job_id(), "abandoning previous job");
        }

        let outcome = self.parse_and_create(&url).await;

        self.busy.send_replace(BusyState::default());

        match outcome {
            Ok(job_id) => Ok(Some(job_id)),
            Err(err) => {
                tracing::warn!(%url, error = %err, "convert failed");
                Err(err)
            }
        }
    }

    pub fn build_request(&self, url: &str) -> ConversionRequest {
        match self.selection.output_type {
            OutputType::Mp4 => ConversionRequest::Video {
                url: url.to_string(),
                quality: self.selection.quality.clone(),
            },
            OutputType::Mp3 => ConversionRequest::Audio {
                url: url.to_string(),
                bitrate: self.selection.bitrate,
            },
        }
    }

    async fn parse_and_create(&mut self, url: &str) -> ConvertResult<String> {
        let video = self.backend.parse(url).await?;
        tracing::info!(title = %video.title, formats = video.mp4_options().len(), "parsed video");

        if self.selection.output_type == OutputType::Mp4
            && let Some(best) = self.settings.quality_policy.pick(video.mp4_options())
        {
            self.selection.quality = best.label.clone();
        }
        self.video = Some(video);

        let request = self.build_request(url);
        let ticket = self.backend.create_job(&request).await?;
        tracing::info!(job_id = %ticket.job_id, "job created");

        self.poller = Some(JobPoller::spawn(
            self.backend.clone(),
            ticket.job_id.clone(),
            self.settings.poll.clone(),
        ));
        Ok(ticket.job_id)
    }
}
