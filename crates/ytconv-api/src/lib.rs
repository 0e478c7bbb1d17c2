mod backend;
mod client;

pub use backend::JobBackend;
pub use client::{API_PREFIX, ApiClient, DEFAULT_TIMEOUT};
