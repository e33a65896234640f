//! HTTP client for the relay API, used by the CLI and by simulated workers.

use reqwest::{Client, StatusCode};

use crate::api::{AckResponse, JobStatusResponse, NextJobResponse, SubmitJobResponse};
use crate::coordinator::HealthSnapshot;
use crate::error::Result;
use crate::scheduler::{Job, JobId, LoginRequest, ResultReport};

#[derive(Debug, Clone)]
pub struct RelayClient {
    base_url: String,
    http: Client,
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Submit a login and wait for the relay's answer.
    ///
    /// Rejections (400/408/503) are not errors here: the relay answers them
    /// with the same body shape, so the status code is returned alongside it.
    pub async fn submit(&self, request: &LoginRequest) -> Result<(StatusCode, SubmitJobResponse)> {
        let response = self
            .http
            .post(self.url("/jobs"))
            .json(request)
            .send()
            .await?;
        let status = response.status();
        let body = response.json::<SubmitJobResponse>().await?;
        Ok((status, body))
    }

    pub async fn status(&self, job_id: &JobId) -> Result<JobStatusResponse> {
        let path = format!("/jobs/{}/status", job_id);
        Ok(self
            .http
            .get(self.url(&path))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    pub async fn health(&self) -> Result<HealthSnapshot> {
        Ok(self
            .http
            .get(self.url("/health"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    /// Worker side: pull the next job, if any.
    pub async fn next_job(&self) -> Result<Option<Job>> {
        let response: NextJobResponse = self
            .http
            .get(self.url("/jobs/next"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.job)
    }

    /// Worker side: report a job outcome.
    pub async fn report(&self, report: &ResultReport) -> Result<bool> {
        let ack: AckResponse = self
            .http
            .post(self.url("/jobs/result"))
            .json(report)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(ack.success)
    }

    /// Worker side: signal presence.
    pub async fn heartbeat(&self) -> Result<bool> {
        let ack: AckResponse = self
            .http
            .post(self.url("/worker/heartbeat"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(ack.success)
    }
}
