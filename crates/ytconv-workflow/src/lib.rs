mod poller;
mod view;
mod workflow;

#[cfg(test)]
mod testing;

pub use poller::{DEFAULT_POLL_INTERVAL, JobPoller, PollSettings, PollState};
pub use view::JobView;
pub use workflow::{BusyState, OutputSelection, Workflow, WorkflowSettings};
