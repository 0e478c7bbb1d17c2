use async_trait::async_trait;
use ytconv_core::{ConversionRequest, ConvertResult, Job, JobTicket, VideoMetadata};

use crate::ApiClient;

/// The three backend calls the conversion workflow depends on.
#[async_trait]
pub trait JobBackend: Send + Sync {
    async fn parse(&self, url: &str) -> ConvertResult<VideoMetadata>;
    async fn create_job(&self, request: &ConversionRequest) -> ConvertResult<JobTicket>;
    async fn get_job(&self, job_id: &str) -> ConvertResult<Job>;
}

#[async_trait]
impl JobBackend for ApiClient {
    async fn parse(&self, url: &str) -> ConvertResult<VideoMetadata> {
        ApiClient::parse(self, url).await
    }

    async fn create_job(&self, request: &ConversionRequest) -> ConvertResult<JobTicket> {
        ApiClient::create_job(self, request).await
    }

    async fn get_job(&self, job_id: &str) -> ConvertResult<Job> {
        ApiClient::get_job(self, job_id).await
    }
}
