use std::{cmp::min, time::Duration};

use anyhow::{Context, anyhow};
use futures_util::StreamExt;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use reqwest::{Client, ClientBuilder, Response};
use serde_json::Value;

use crate::configuration::ProxyConfig;

/// Longest wait for the next bytes of a response before the request fails.
/// Applies per read, so large downloads are not capped as a whole.
pub const READ_TIMEOUT: Duration = Duration::from_secs(60);

pub fn make_client(proxy: &ProxyConfig) -> anyhow::Result<Client> {
    make_client_with(proxy, READ_TIMEOUT)
}

fn make_client_with(proxy: &ProxyConfig, read_timeout: Duration) -> anyhow::Result<Client> {
    let client_builder = ClientBuilder::new()
        .user_agent(concat!("falgen/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(30))
        .read_timeout(read_timeout)
        .use_rustls_tls();
    let client_builder = if let Some(proxy) = proxy.get_proxy() {
        client_builder.proxy(proxy)
    } else {
        client_builder.no_proxy()
    };
    let client = client_builder.build()?;

    Ok(client)
}

/// Turns a non-success response into an error carrying the remote `detail`.
pub async fn response_error(action: &str, response: Response) -> anyhow::Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|value| value.get("detail").cloned())
        .map(|detail| match detail {
            Value::String(text) => text,
            other => other.to_string(),
        })
        .unwrap_or_else(|| body.chars().take(512).collect());
    if detail.is_empty() {
        anyhow!("{action} failed with {status}")
    } else {
        anyhow!("{action} failed with {status}: {detail}")
    }
}

fn progress_bar(length: Option<u64>) -> ProgressBar {
    match length {
        Some(length) => {
            let pb = ProgressBar::new(length);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{wide_bar:.cyan/blue}] {decimal_bytes}/{decimal_total_bytes} [{elapsed}] ETA:{eta}")
            {
                pb.set_style(style.progress_chars("=>-"));
            }
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner()
                .template("{spinner:.green} {decimal_bytes} [{elapsed}]")
            {
                pb.set_style(style);
            }
            pb
        }
    }
}

/// Streams `url` into memory while drawing a byte progress bar.
pub async fn download_bytes(
    client: &Client,
    url: &str,
    progress: &MultiProgress,
) -> anyhow::Result<Vec<u8>> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Request to {url} failed"))?;
    if !response.status().is_success() {
        return Err(response_error("Download", response).await);
    }

    let content_length = response.content_length();
    let pb = progress.add(progress_bar(content_length));
    let mut buffer = Vec::with_capacity(content_length.unwrap_or_default() as usize);
    let mut download_stream = response.bytes_stream();

    while let Some(chunk) = download_stream.next().await {
        let chunk = chunk.with_context(|| format!("Download of {url} was interrupted"))?;
        buffer.extend_from_slice(&chunk);
        let position = buffer.len() as u64;
        pb.set_position(content_length.map_or(position, |total| min(position, total)));
    }

    pb.finish_and_clear();
    progress.remove(&pb);
    Ok(buffer)
}
