//! Client of the external feature-extraction service (FES).
//!
//! Analyses are submitted as jobs and polled until they complete:
//!
//! - `POST {host}/api/tasks/{task}/{model}/jobs` with `{"inputs": [...]}` returns `{"id": ...}`
//! - `GET {host}/api/tasks/{task}/jobs/{id}` returns the job status and, once
//!   complete, one result per input in input order

use mediax_core::{Content, ContentElement, Error, Parameters, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_HOST: &str = "http://localhost:8888";
pub const DEFAULT_TIMEOUT_MS: u64 = 20_000;
pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 100;
pub const DEFAULT_RETRIES: u32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct FesParameters {
    pub host: String,
    pub timeout_ms: u64,
    pub polling_interval_ms: u64,
    pub retries: u32,
}

impl Default for FesParameters {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            polling_interval_ms: DEFAULT_POLLING_INTERVAL_MS,
            retries: DEFAULT_RETRIES,
        }
    }
}

fn parse<T: std::str::FromStr>(parameters: &Parameters, key: &str, default: T) -> Result<T> {
    match parameters.get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("invalid value '{}' for parameter '{}'", raw, key))),
        None => Ok(default),
    }
}

impl FesParameters {
    /// Reads `host`, `timeout_ms`, `polling_interval_ms` and `retries`.
    pub fn from_parameters(parameters: &Parameters) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            host: parameters
                .get("host")
                .map(|h| h.trim_end_matches('/').to_string())
                .unwrap_or(defaults.host),
            timeout_ms: parse(parameters, "timeout_ms", defaults.timeout_ms)?,
            polling_interval_ms: parse(parameters, "polling_interval_ms", defaults.polling_interval_ms)?,
            retries: parse(parameters, "retries", defaults.retries)?,
        })
    }
}

/// One input of an analysis job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FesInput {
    Text(String),
    Image {
        width: u32,
        height: u32,
        pixels: Vec<[u8; 3]>,
    },
}

impl FesInput {
    /// Converts text and image content; other content has no FES input.
    pub fn from_content(element: &ContentElement) -> Option<Self> {
        match &element.content {
            Content::Text(text) => Some(FesInput::Text(text.clone())),
            Content::Image { width, height, pixels } => Some(FesInput::Image {
                width: *width,
                height: *height,
                pixels: pixels.clone(),
            }),
            Content::Audio { .. } | Content::Binary { .. } => None,
        }
    }
}

#[derive(Serialize)]
struct JobRequest<'a> {
    inputs: &'a [FesInput],
}

#[derive(Deserialize)]
struct JobCreated {
    id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum JobStatus {
    Queued,
    Running,
    Complete,
    Failed,
}

#[derive(Deserialize)]
struct JobState<T> {
    status: JobStatus,
    #[serde(default = "Vec::new")]
    results: Vec<T>,
    #[serde(default)]
    error: Option<String>,
}

pub struct FesClient {
    http: reqwest::Client,
    parameters: FesParameters,
}

impl FesClient {
    pub fn new(parameters: FesParameters) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(parameters.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("cannot build FES client: {}", e)))?;
        Ok(Self { http, parameters })
    }

    pub fn parameters(&self) -> &FesParameters {
        &self.parameters
    }

    fn submit_url(&self, task: &str, model: &str) -> String {
        format!("{}/api/tasks/{}/{}/jobs", self.parameters.host, task, model)
    }

    fn job_url(&self, task: &str, id: &str) -> String {
        format!("{}/api/tasks/{}/jobs/{}", self.parameters.host, task, id)
    }

    /// Runs `request` up to `retries + 1` times, waiting the polling interval
    /// between attempts.
    async fn with_retries<T, F, Fut>(&self, what: &str, request: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, reqwest::Error>>,
    {
        let mut attempt = 0;
        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.parameters.retries => {
                    attempt += 1;
                    warn!("FES {} failed (attempt {}): {}", what, attempt, e);
                    tokio::time::sleep(Duration::from_millis(self.parameters.polling_interval_ms)).await;
                }
                Err(e) => return Err(Error::Backend(format!("FES {} failed: {}", what, e))),
            }
        }
    }

    /// Analyses all inputs in one job and returns one result per input.
    pub async fn analyse_batched<T>(&self, task: &str, model: &str, inputs: &[FesInput]) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let http = &self.http;
        let submit_url = self.submit_url(task, model);
        let submit_url = submit_url.as_str();
        let job: JobCreated = self
            .with_retries("job submission", move || async move {
                http.post(submit_url)
                    .json(&JobRequest { inputs })
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<JobCreated>()
                    .await
            })
            .await?;
        debug!("FES job {} submitted for {} inputs to {}/{}", job.id, inputs.len(), task, model);

        let job_url = self.job_url(task, &job.id);
        let job_url = job_url.as_str();
        let deadline = Instant::now() + Duration::from_millis(self.parameters.timeout_ms);
        loop {
            let state: JobState<T> = self
                .with_retries("job polling", move || async move {
                    http.get(job_url).send().await?.error_for_status()?.json::<JobState<T>>().await
                })
                .await?;
            match state.status {
                JobStatus::Complete => return check_results(state.results, inputs.len()),
                JobStatus::Failed => {
                    return Err(Error::Backend(format!(
                        "FES job {} failed: {}",
                        job.id,
                        state.error.unwrap_or_else(|| "unknown error".into())
                    )))
                }
                JobStatus::Queued | JobStatus::Running => {}
            }
            if Instant::now() >= deadline {
                return Err(Error::Backend(format!(
                    "FES job {} did not complete within {} ms",
                    job.id, self.parameters.timeout_ms
                )));
            }
            tokio::time::sleep(Duration::from_millis(self.parameters.polling_interval_ms)).await;
        }
    }
}

fn check_results<T>(results: Vec<T>, expected: usize) -> Result<Vec<T>> {
    if results.len() != expected {
        return Err(Error::Backend(format!(
            "FES returned {} results for {} inputs",
            results.len(),
            expected
        )));
    }
    Ok(results)
}
