use ytconv_core::Job;

pub const PLACEHOLDER: &str = "-";
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Presentation values derived from the latest job snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobView {
    pub job_id: String,
    pub status: String,
    pub stage: String,
    pub progress: u8,
    pub download_url: Option<String>,
    pub error: Option<String>,
}

impl JobView {
    pub fn new(job_id: &str, job: Option<&Job>, base_url: &str) -> Self {
        let status = job
            .map(|job| job.status.as_str())
            .filter(|status| !status.is_empty())
            .unwrap_or(PLACEHOLDER)
            .to_string();
        let stage = job
            .and_then(|job| job.stage.as_deref())
            .unwrap_or(PLACEHOLDER)
            .to_string();
        let progress = job.and_then(|job| job.progress).unwrap_or(0).min(100);

        let download_url = job
            .filter(|job| job.is_finished())
            .and_then(|job| job.download_url.as_deref())
            .map(|path| format!("{base_url}{path}"));

        let error = job.filter(|job| job.is_failed()).map(|job| {
            job.error
                .clone()
                .filter(|error| !error.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_ERROR.to_string())
        });

        Self {
            job_id: job_id.to_string(),
            status,
            stage,
            progress,
            download_url,
            error,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.download_url.is_some()
    }
}
