//! Resolves user supplied input references into URLs the remote service can
//! fetch. Local files are uploaded once; URLs pass through untouched.

use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use reqwest::Url;
use tokio::fs;

use crate::{errors::GenerationError, utils};

/// Remote object storage: put bytes, get back a fetchable URL.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        content_type: &str,
    ) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagedInput {
    Remote { url: String },
    Uploaded { url: String, source: PathBuf },
}

impl StagedInput {
    pub fn url(&self) -> &str {
        match self {
            StagedInput::Remote { url } | StagedInput::Uploaded { url, .. } => url,
        }
    }
}

fn is_fetchable_url(reference: &str) -> bool {
    match Url::parse(reference) {
        Ok(url) => match url.scheme() {
            "http" | "https" => url.host().is_some(),
            "data" => true,
            _ => false,
        },
        Err(_) => false,
    }
}

async fn is_local_file(reference: &str) -> bool {
    fs::metadata(reference)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

async fn upload_file<U>(uploader: &U, path: &Path) -> anyhow::Result<String>
where
    U: Uploader + ?Sized,
{
    let bytes = fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());
    let content_type = utils::guess_content_type(&file_name, &bytes);
    tracing::info!(
        file = %path.display(),
        size = bytes.len(),
        content_type = %content_type,
        "uploading input"
    );
    uploader.upload(bytes, &file_name, &content_type).await
}

pub async fn stage<U>(uploader: &U, reference: &str) -> Result<StagedInput, GenerationError>
where
    U: Uploader + ?Sized,
{
    let upload_failed = |cause: anyhow::Error| GenerationError::UploadFailed {
        reference: reference.to_string(),
        cause,
    };

    if is_local_file(reference).await {
        let source = PathBuf::from(reference);
        let url = upload_file(uploader, &source).await.map_err(upload_failed)?;
        tracing::info!(%url, "input uploaded");
        return Ok(StagedInput::Uploaded { url, source });
    }

    if is_fetchable_url(reference) {
        tracing::debug!(reference, "input is already a URL");
        return Ok(StagedInput::Remote {
            url: reference.to_string(),
        });
    }

    Err(upload_failed(anyhow!(
        "not an existing file and not a well-formed URL"
    )))
}

/// Stages every reference in order, stopping at the first failure.
pub async fn stage_all<U>(
    uploader: &U,
    references: &[String],
) -> Result<Vec<StagedInput>, GenerationError>
where
    U: Uploader + ?Sized,
{
    let mut staged = Vec::with_capacity(references.len());
    for reference in references {
        staged.push(stage(uploader, reference).await?);
    }
    Ok(staged)
}
