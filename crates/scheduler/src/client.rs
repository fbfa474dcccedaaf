//! Cloud Scheduler REST client.

use std::sync::Arc;

use async_trait::async_trait;
use cronsource_reconciler::{ExternalJob, ExternalJobClient, JobClientError, JobName};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use tracing::{debug, info};

use crate::auth::{TokenSource, token_source};
use crate::config::SchedulerConfig;
use crate::error::{Error, Result};
use crate::wire::JobResource;

/// Client for the Cloud Scheduler v1 jobs API.
#[derive(Clone)]
pub struct SchedulerClient {
    /// Configuration for the client.
    config: Arc<SchedulerConfig>,
    /// HTTP client shared by all calls.
    http_client: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
}

impl SchedulerClient {
    /// Create a client with the token source named in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be built.
    pub fn with_config(config: SchedulerConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::config(e.to_string()))?;
        let tokens = token_source(&config.token, http_client.clone());

        Ok(Self {
            config: Arc::new(config),
            http_client,
            tokens,
        })
    }

    /// Replace the token source.
    #[must_use]
    pub fn with_token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = tokens;
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    async fn request(&self, method: Method, resource: &str) -> Result<RequestBuilder> {
        let url = self.config.resource_url(resource)?;
        let builder = self.http_client.request(method, url);
        Ok(match self.tokens.token().await? {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    /// Fetch a job.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the job does not exist.
    pub async fn get_job(&self, name: &JobName) -> Result<ExternalJob> {
        let job = name.to_string();
        debug!(job = %job, "Fetching job");
        let response = self.request(Method::GET, &job).await?.send().await?;
        read_job(check(response, &job).await?).await
    }

    /// Create a job under its parent.
    ///
    /// # Errors
    ///
    /// Any non-success answer from the API.
    pub async fn create_job(&self, name: &JobName, job: &ExternalJob) -> Result<ExternalJob> {
        let body = JobResource::from(&ExternalJob {
            name: name.to_string(),
            ..job.clone()
        });
        info!(job = %name, schedule = %job.schedule, "Creating job");
        let response = self
            .request(Method::POST, &format!("{}/jobs", name.parent()))
            .await?
            .json(&body)
            .send()
            .await?;
        read_job(check(response, &body.name).await?).await
    }

    /// Replace a job's schedule and target.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the job does not exist.
    pub async fn update_job(&self, job: &ExternalJob) -> Result<ExternalJob> {
        info!(job = %job.name, schedule = %job.schedule, "Updating job");
        let response = self
            .request(Method::PATCH, &job.name)
            .await?
            .json(&JobResource::from(job))
            .send()
            .await?;
        read_job(check(response, &job.name).await?).await
    }

    /// Delete a job.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the job does not exist.
    pub async fn delete_job(&self, name: &JobName) -> Result<()> {
        let job = name.to_string();
        info!(job = %job, "Deleting job");
        let response = self.request(Method::DELETE, &job).await?.send().await?;
        check(response, &job).await?;
        Ok(())
    }
}

/// Classify a response by status code.
async fn check(response: Response, job: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(Error::not_found(job));
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::status(status.as_u16(), body))
}

async fn read_job(response: Response) -> Result<ExternalJob> {
    let resource: JobResource = response.json().await?;
    ExternalJob::try_from(resource)
}

#[async_trait]
impl ExternalJobClient for SchedulerClient {
    async fn get(&self, name: &JobName) -> std::result::Result<ExternalJob, JobClientError> {
        Ok(self.get_job(name).await?)
    }

    async fn create(
        &self,
        name: &JobName,
        job: &ExternalJob,
    ) -> std::result::Result<ExternalJob, JobClientError> {
        Ok(self.create_job(name, job).await?)
    }

    async fn update(&self, job: &ExternalJob) -> std::result::Result<ExternalJob, JobClientError> {
        Ok(self.update_job(job).await?)
    }

    async fn delete(&self, name: &JobName) -> std::result::Result<(), JobClientError> {
        Ok(self.delete_job(name).await?)
    }
}
