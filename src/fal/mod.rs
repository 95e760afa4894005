//! fal.ai queue and storage client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use indicatif::MultiProgress;
use reqwest::{Client, Method, RequestBuilder, Url, header};
use serde_json::Value;

use crate::{
    configuration::Settings,
    downloader::{self, response_error},
    job::{InferenceQueue, QueueTicket, RemoteState, StatusUpdate},
    materialize::ArtifactFetcher,
    staging::Uploader,
};

mod model;

use model::{
    InitiateUploadRequest, InitiateUploadResponse, QueueStatus, StatusResponse, SubmitResponse,
};

pub struct FalClient {
    http: Client,
    api_key: String,
    queue_base: Url,
    storage_base: Url,
    progress: MultiProgress,
}

fn endpoint(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

impl FalClient {
    pub fn new(settings: &Settings, progress: MultiProgress) -> Result<Self> {
        Ok(Self {
            http: downloader::make_client(&settings.proxy)
                .context("Failed to initialize HTTP client")?,
            api_key: settings.api_key.clone(),
            queue_base: settings.queue_base.clone(),
            storage_base: settings.storage_base.clone(),
            progress,
        })
    }

    fn authorized(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(header::AUTHORIZATION, format!("Key {}", self.api_key))
            .header(header::ACCEPT, "application/json")
    }

    async fn get_json(&self, action: &str, url: &str) -> Result<Value> {
        let response = self
            .authorized(Method::GET, url)
            .send()
            .await
            .with_context(|| format!("{action} request to {url} failed"))?;
        if !response.status().is_success() {
            return Err(response_error(action, response).await);
        }
        response
            .json::<Value>()
            .await
            .with_context(|| format!("{action} returned malformed JSON"))
    }
}

#[async_trait]
impl Uploader for FalClient {
    async fn upload(&self, bytes: Vec<u8>, file_name: &str, content_type: &str) -> Result<String> {
        let initiate_url = endpoint(
            &self.storage_base,
            "storage/upload/initiate?storage_type=fal-cdn-v3",
        );
        let response = self
            .authorized(Method::POST, &initiate_url)
            .json(&InitiateUploadRequest {
                content_type,
                file_name,
            })
            .send()
            .await
            .context("Upload initiation request failed")?;
        if !response.status().is_success() {
            return Err(response_error("Upload initiation", response).await);
        }
        let initiated = response
            .json::<InitiateUploadResponse>()
            .await
            .context("Upload initiation returned malformed JSON")?;

        let response = self
            .http
            .put(&initiated.upload_url)
            .header(header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .context("Upload request failed")?;
        if !response.status().is_success() {
            return Err(response_error("Upload", response).await);
        }

        Ok(initiated.file_url)
    }
}

#[async_trait]
impl InferenceQueue for FalClient {
    async fn submit(&self, model_id: &str, payload: &Value) -> Result<QueueTicket> {
        let url = endpoint(&self.queue_base, model_id);
        let response = self
            .authorized(Method::POST, &url)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("Submission to {url} failed"))?;
        if !response.status().is_success() {
            return Err(response_error("Submission", response).await);
        }
        let submitted = response
            .json::<SubmitResponse>()
            .await
            .context("Submission returned malformed JSON")?;
        Ok(QueueTicket {
            request_id: submitted.request_id,
            status_url: submitted.status_url,
            response_url: submitted.response_url,
        })
    }

    async fn status(&self, ticket: &QueueTicket) -> Result<StatusUpdate> {
        let url = format!("{}?logs=1", ticket.status_url);
        let raw = self.get_json("Status check", &url).await?;
        let status = serde_json::from_value::<StatusResponse>(raw)
            .context("Status check returned an unexpected document")?;
        Ok(into_update(status))
    }

    async fn result(&self, ticket: &QueueTicket) -> Result<Value> {
        self.get_json("Result fetch", &ticket.response_url).await
    }
}

#[async_trait]
impl ArtifactFetcher for FalClient {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        downloader::download_bytes(&self.http, url, &self.progress).await
    }
}

fn into_update(status: StatusResponse) -> StatusUpdate {
    let state = match status.status {
        QueueStatus::InQueue => RemoteState::InQueue,
        QueueStatus::InProgress => RemoteState::InProgress,
        QueueStatus::Completed => RemoteState::Completed {
            error: status.error.filter(|e| !e.is_empty()),
        },
    };
    StatusUpdate {
        state,
        queue_position: status.queue_position,
        logs: status
            .logs
            .unwrap_or_default()
            .into_iter()
            .map(|entry| entry.message)
            .collect(),
    }
}
