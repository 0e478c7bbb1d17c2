use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use ytconv_api::JobBackend;
use ytconv_core::Job;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    /// Consecutive failed fetches before giving up. `None` polls forever.
    pub max_failures: Option<u32>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_failures: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    /// No snapshot received yet.
    Pending,
    Running(Job),
    /// The job reached `finished` or `failed`; no more fetches are issued.
    Done(Job),
    GaveUp {
        last: Option<Job>,
        failures: u32,
        error: String,
    },
}

impl PollState {
    pub fn job(&self) -> Option<&Job> {
        match self {
            PollState::Pending => None,
            PollState::Running(job) | PollState::Done(job) => Some(job),
            PollState::GaveUp { last, .. } => last.as_ref(),
        }
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, PollState::Done(_) | PollState::GaveUp { .. })
    }
}

/// Handle to the status-polling task of one job.
///
/// Each poller publishes into its own channel, so a poller that was replaced
/// can never touch the state of a newer job. Dropping the handle aborts the
/// task together with any pending delayed fetch.
#[derive(Debug)]
pub struct JobPoller {
    job_id: String,
    state: watch::Receiver<PollState>,
    handle: JoinHandle<()>,
}

impl JobPoller {
    pub fn spawn<B>(backend: Arc<B>, job_id: impl Into<String>, settings: PollSettings) -> Self
    where
        B: JobBackend + ?Sized + 'static,
    {
        let job_id = job_id.into();
        let (tx, rx) = watch::channel(PollState::Pending);
        let handle = tokio::spawn(poll_loop(backend, job_id.clone(), settings, tx));
        Self {
            job_id,
            state: rx,
            handle,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn state(&self) -> PollState {
        self.state.borrow().clone()
    }

    pub fn job(&self) -> Option<Job> {
        self.state.borrow().job().cloned()
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Waits until polling stops, calling `on_change` with every new state.
    ///
    /// Returns the last state seen. If the poller is cancelled first, that
    /// state is not a stopped one.
    pub async fn wait(&mut self, mut on_change: impl FnMut(&PollState)) -> PollState {
        loop {
            let state = self.state.borrow_and_update().clone();
            on_change(&state);
            if state.is_stopped() {
                return state;
            }
            if self.state.changed().await.is_err() {
                let last = self.state.borrow().clone();
                if last != state {
                    on_change(&last);
                }
                return last;
            }
        }
    }
}

impl Drop for JobPoller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn poll_loop<B>(
    backend: Arc<B>,
    job_id: String,
    settings: PollSettings,
    tx: watch::Sender<PollState>,
) where
    B: JobBackend + ?Sized,
{
    let mut failures = 0u32;
    loop {
        match backend.get_job(&job_id).await {
            Ok(job) => {
                failures = 0;
                let terminal = job.is_terminal();
                tracing::debug!(
                    job_id = %job_id,
                    status = %job.status,
                    progress = job.progress.unwrap_or(0),
                    "job status"
                );
                let state = if terminal {
                    PollState::Done(job)
                } else {
                    PollState::Running(job)
                };
                if tx.send(state).is_err() || terminal {
                    return;
                }
            }
            Err(err) => {
                failures += 1;
                tracing::debug!(job_id = %job_id, attempt = failures, error = %err, "job status fetch failed");
                if let Some(limit) = settings.max_failures
                    && failures >= limit
                {
                    tracing::warn!(job_id = %job_id, failures, "giving up on job status");
                    let last = tx.borrow().job().cloned();
                    tx.send_replace(PollState::GaveUp {
                        last,
                        failures,
                        error: err.user_message(),
                    });
                    return;
                }
            }
        }
        tokio::time::sleep(settings.interval).await;
    }
}
