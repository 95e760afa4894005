use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct InitiateUploadRequest<'a> {
    pub content_type: &'a str,
    pub file_name: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitiateUploadResponse {
    pub upload_url: String,
    pub file_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub request_id: String,
    pub status_url: String,
    pub response_url: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    InQueue,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogEntry {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub status: QueueStatus,
    #[serde(default)]
    pub queue_position: Option<u32>,
    #[serde(default)]
    pub logs: Option<Vec<LogEntry>>,
    #[serde(default)]
    pub error: Option<String>,
}
