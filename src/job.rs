//! Job submission: payload construction and driving a remote job to a
//! terminal state while forwarding progress to an observer.

use std::{fmt, time::Duration};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{
    errors::{GenerationError, ValidationError},
    schema::{self, ArtifactField, InputBinding, ModelSchema, ValidatedOptions},
    staging::StagedInput,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        })
    }
}

/// Handle returned by the remote queue on submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTicket {
    pub request_id: String,
    pub status_url: String,
    pub response_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteState {
    InQueue,
    InProgress,
    Completed { error: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub state: RemoteState,
    pub queue_position: Option<u32>,
    /// Every log line emitted so far, oldest first.
    pub logs: Vec<String>,
}

#[async_trait]
pub trait InferenceQueue: Send + Sync {
    async fn submit(&self, model_id: &str, payload: &Value) -> anyhow::Result<QueueTicket>;
    async fn status(&self, ticket: &QueueTicket) -> anyhow::Result<StatusUpdate>;
    async fn result(&self, ticket: &QueueTicket) -> anyhow::Result<Value>;
}

/// Side channel for job progress. Log lines arrive exactly as the remote
/// service emitted them.
pub trait ProgressObserver: Send + Sync {
    fn on_status(&self, request_id: &str, status: JobStatus, queue_position: Option<u32>);
    fn on_log(&self, line: &str);
}

/// Observer that discards everything.
pub struct SilentObserver;

impl ProgressObserver for SilentObserver {
    fn on_status(&self, _: &str, _: JobStatus, _: Option<u32>) {}
    fn on_log(&self, _: &str) {}
}

/// One produced output as listed in the job result.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Artifact {
    pub url: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub fps: Option<f64>,
    #[serde(default)]
    pub num_frames: Option<u64>,
    #[serde(skip)]
    pub nsfw: Option<bool>,
}

impl Artifact {
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.width.zip(self.height)
    }
}

/// A job that reached `succeeded`.
#[derive(Debug, Clone)]
pub struct Job {
    pub request_id: String,
    pub model_id: &'static str,
    pub status: JobStatus,
    pub artifacts: Vec<Artifact>,
    pub seed: Option<u64>,
}

pub fn build_payload(
    schema: &ModelSchema,
    options: &ValidatedOptions,
    inputs: &[StagedInput],
) -> Result<Map<String, Value>, ValidationError> {
    let references = inputs
        .iter()
        .map(|input| input.url().to_string())
        .collect::<Vec<_>>();
    schema::validate_inputs(schema, &references)?;

    let mut payload = Map::new();
    for (key, value) in options.iter() {
        payload.insert(
            key.to_string(),
            serde_json::to_value(value).unwrap_or(Value::Null),
        );
    }
    match schema.input {
        InputBinding::None => {}
        InputBinding::Single(field) => {
            payload.insert(field.to_string(), Value::String(references[0].clone()));
        }
        InputBinding::List(field) => {
            payload.insert(
                field.to_string(),
                Value::Array(references.into_iter().map(Value::String).collect()),
            );
        }
    }
    Ok(payload)
}

/// Pulls artifacts, safety flags and the seed out of a result document.
pub fn parse_artifacts(
    field: ArtifactField,
    result: &Value,
) -> anyhow::Result<(Vec<Artifact>, Option<u64>)> {
    let mut artifacts = match field {
        ArtifactField::List(key) => {
            let list = result
                .get(key)
                .ok_or_else(|| anyhow!("Result has no \"{key}\" field"))?;
            Vec::<Artifact>::deserialize(list)?
        }
        ArtifactField::Single(key) => {
            let item = result
                .get(key)
                .ok_or_else(|| anyhow!("Result has no \"{key}\" field"))?;
            vec![Artifact::deserialize(item)?]
        }
    };
    if artifacts.is_empty() {
        bail!("Result contains no artifacts");
    }
    if let Some(flags) = result.get("has_nsfw_concepts").and_then(Value::as_array) {
        for (artifact, flag) in artifacts.iter_mut().zip(flags) {
            artifact.nsfw = flag.as_bool();
        }
    }
    let seed = result.get("seed").and_then(Value::as_u64);
    Ok((artifacts, seed))
}

pub struct JobSubmitter<'a, Q: ?Sized> {
    queue: &'a Q,
    poll_interval: Duration,
}

impl<'a, Q> JobSubmitter<'a, Q>
where
    Q: InferenceQueue + ?Sized,
{
    pub fn new(queue: &'a Q, poll_interval: Duration) -> Self {
        Self {
            queue,
            poll_interval,
        }
    }

    /// Submits once and blocks until the job succeeds or fails. There is no
    /// retry; every failure surfaces as [`GenerationError::JobFailed`].
    pub async fn submit(
        &self,
        schema: &'static ModelSchema,
        options: &ValidatedOptions,
        inputs: &[StagedInput],
        observer: &dyn ProgressObserver,
    ) -> Result<Job, GenerationError> {
        let model = schema.model_id;
        let payload = Value::Object(build_payload(schema, options, inputs)?);
        tracing::debug!(model, payload = %payload, "submitting job");

        let ticket = self
            .queue
            .submit(model, &payload)
            .await
            .map_err(|e| GenerationError::job_failed(model, format!("{e:#}")))?;
        tracing::info!(model, request_id = %ticket.request_id, "job accepted");

        let fail = |cause: String| {
            observer.on_status(&ticket.request_id, JobStatus::Failed, None);
            GenerationError::job_failed(model, cause)
        };

        let mut status = JobStatus::Queued;
        observer.on_status(&ticket.request_id, status, None);
        let mut forwarded = 0;
        loop {
            let update = self
                .queue
                .status(&ticket)
                .await
                .map_err(|e| fail(format!("{e:#}")))?;
            for line in update.logs.iter().skip(forwarded) {
                observer.on_log(line);
            }
            forwarded = forwarded.max(update.logs.len());

            let next = match &update.state {
                RemoteState::InQueue => JobStatus::Queued,
                RemoteState::InProgress => JobStatus::Running,
                RemoteState::Completed { error: Some(error) } => return Err(fail(error.clone())),
                RemoteState::Completed { error: None } => break,
            };
            if next != status || update.queue_position.is_some() {
                status = next;
                observer.on_status(&ticket.request_id, status, update.queue_position);
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        let result = self
            .queue
            .result(&ticket)
            .await
            .map_err(|e| fail(format!("{e:#}")))?;
        let (artifacts, seed) = parse_artifacts(schema.output.artifacts, &result)
            .map_err(|e| fail(format!("Malformed result: {e:#}")))?;

        observer.on_status(&ticket.request_id, JobStatus::Succeeded, None);
        tracing::info!(
            model,
            request_id = %ticket.request_id,
            artifacts = artifacts.len(),
            "job succeeded"
        );
        Ok(Job {
            request_id: ticket.request_id,
            model_id: model,
            status: JobStatus::Succeeded,
            artifacts,
            seed,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use serde_json::json;

    use super::*;
    use crate::schema::{RawOptions, find, validate};

    /// Queue whose status responses are scripted up front.
    pub(crate) struct ScriptedQueue {
        pub submitted: Mutex<Vec<(String, Value)>>,
        pub updates: Mutex<VecDeque<anyhow::Result<StatusUpdate>>>,
        pub result: Mutex<Option<anyhow::Result<Value>>>,
        pub reject_submit: bool,
    }

    impl ScriptedQueue {
        pub fn new(updates: Vec<StatusUpdate>, result: anyhow::Result<Value>) -> Self {
            Self {
                submitted: Mutex::new(Vec::new()),
                updates: Mutex::new(updates.into_iter().map(Ok).collect()),
                result: Mutex::new(Some(result)),
                reject_submit: false,
            }
        }
    }

    pub(crate) fn update(state: RemoteState, logs: &[&str]) -> StatusUpdate {
        StatusUpdate {
            state,
            queue_position: None,
            logs: logs.iter().map(ToString::to_string).collect(),
        }
    }

    #[async_trait]
    impl InferenceQueue for ScriptedQueue {
        async fn submit(&self, model_id: &str, payload: &Value) -> anyhow::Result<QueueTicket> {
            if self.reject_submit {
                bail!("422 Unprocessable Entity");
            }
            self.submitted
                .lock()
                .unwrap()
                .push((model_id.to_string(), payload.clone()));
            Ok(QueueTicket {
                request_id: "req-1".into(),
                status_url: "https://queue.test/status".into(),
                response_url: "https://queue.test/response".into(),
            })
        }

        async fn status(&self, _: &QueueTicket) -> anyhow::Result<StatusUpdate> {
            self.updates
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(update(RemoteState::Completed { error: None }, &[])))
        }

        async fn result(&self, _: &QueueTicket) -> anyhow::Result<Value> {
            self.result
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(anyhow!("result fetched twice")))
        }
    }

    #[derive(Default)]
    pub(crate) struct RecordingObserver {
        pub statuses: Mutex<Vec<JobStatus>>,
        pub logs: Mutex<Vec<String>>,
    }

    impl ProgressObserver for RecordingObserver {
        fn on_status(&self, _: &str, status: JobStatus, _: Option<u32>) {
            self.statuses.lock().unwrap().push(status);
        }

        fn on_log(&self, line: &str) {
            self.logs.lock().unwrap().push(line.to_string());
        }
    }

    fn staged(url: &str) -> StagedInput {
        StagedInput::Remote { url: url.into() }
    }

    fn options(schema: &ModelSchema, pairs: &[(&str, &str)]) -> ValidatedOptions {
        let raw = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<RawOptions>();
        validate(&raw, schema).unwrap()
    }

    #[test]
    fn single_and_list_bindings_have_the_right_cardinality() {
        let ltx = find("i2v-ltx-2").unwrap();
        let payload =
            build_payload(ltx, &options(ltx, &[]), &[staged("https://x/a.png")]).unwrap();
        assert_eq!(payload["image_url"], json!("https://x/a.png"));
        assert_eq!(payload["duration"], json!(6));
        assert_eq!(payload["motion_scale"], json!(1.0));

        let edit = find("i2i-qwen-image-edit").unwrap();
        let payload = build_payload(
            edit,
            &options(edit, &[("prompt", "blue sky")]),
            &[staged("https://x/a.png")],
        )
        .unwrap();
        assert_eq!(payload["image_urls"], json!(["https://x/a.png"]));
        assert!(payload.get("image_url").is_none());
        assert!(payload.get("seed").is_none());
    }

    #[test]
    fn payload_rejects_wrong_input_count() {
        let ltx = find("i2v-ltx-2").unwrap();
        let err = build_payload(ltx, &options(ltx, &[]), &[]).unwrap_err();
        assert!(matches!(err, ValidationError::InputCount { given: 0, .. }));
    }

    #[test]
    fn artifacts_carry_safety_flags_and_seed() -> anyhow::Result<()> {
        let result = json!({
            "images": [
                {
                    "url": "https://cdn/1.png",
                    "width": 1024,
                    "height": 768,
                    "content_type": "image/png"
                },
                {"url": "https://cdn/2.png"}
            ],
            "has_nsfw_concepts": [false, true],
            "seed": 42
        });
        let (artifacts, seed) = parse_artifacts(ArtifactField::List("images"), &result)?;
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].dimensions(), Some((1024, 768)));
        assert_eq!(artifacts[0].nsfw, Some(false));
        assert_eq!(artifacts[1].nsfw, Some(true));
        assert_eq!(seed, Some(42));

        assert!(parse_artifacts(ArtifactField::List("images"), &json!({"images": []})).is_err());
        assert!(parse_artifacts(ArtifactField::Single("video"), &json!({"images": []})).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn drives_job_to_success_and_forwards_new_logs_once() {
        let schema = find("i2v-ltx-2").unwrap();
        let queue = ScriptedQueue::new(
            vec![
                update(RemoteState::InQueue, &[]),
                update(RemoteState::InProgress, &["loading model"]),
                update(RemoteState::InProgress, &["loading model", "step 1/8"]),
                update(
                    RemoteState::Completed { error: None },
                    &["loading model", "step 1/8", "done"],
                ),
            ],
            Ok(json!({"video": {"url": "https://cdn/v.mp4", "content_type": "video/mp4"}})),
        );
        let observer = RecordingObserver::default();
        let job = JobSubmitter::new(&queue, Duration::ZERO)
            .submit(
                schema,
                &options(schema, &[]),
                &[staged("https://x/a.png")],
                &observer,
            )
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.artifacts.len(), 1);
        assert_eq!(job.request_id, "req-1");
        assert_eq!(
            *observer.logs.lock().unwrap(),
            vec!["loading model", "step 1/8", "done"]
        );
        assert_eq!(
            *observer.statuses.lock().unwrap(),
            vec![JobStatus::Queued, JobStatus::Running, JobStatus::Succeeded]
        );
        let submitted = queue.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].0, "fal-ai/ltx-2/image-to-video/fast");
    }

    #[tokio::test]
    async fn remote_failure_is_job_failed() {
        let schema = find("t2i-qwen-image").unwrap();
        let queue = ScriptedQueue::new(
            vec![update(
                RemoteState::Completed {
                    error: Some("out of memory".into()),
                },
                &[],
            )],
            Ok(Value::Null),
        );
        let observer = RecordingObserver::default();
        let err = JobSubmitter::new(&queue, Duration::ZERO)
            .submit(schema, &options(schema, &[("prompt", "cat")]), &[], &observer)
            .await
            .unwrap_err();
        assert!(
            matches!(err, GenerationError::JobFailed { ref cause, .. } if cause == "out of memory")
        );
        assert_eq!(
            observer.statuses.lock().unwrap().last(),
            Some(&JobStatus::Failed)
        );
    }

    #[tokio::test]
    async fn rejected_submission_and_bad_result_are_job_failed() {
        let schema = find("t2i-qwen-image").unwrap();
        let mut queue = ScriptedQueue::new(vec![], Ok(Value::Null));
        queue.reject_submit = true;
        let err = JobSubmitter::new(&queue, Duration::ZERO)
            .submit(schema, &options(schema, &[("prompt", "cat")]), &[], &SilentObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::JobFailed { .. }));

        let queue = ScriptedQueue::new(vec![], Ok(json!({"unexpected": true})));
        let err = JobSubmitter::new(&queue, Duration::ZERO)
            .submit(schema, &options(schema, &[("prompt", "cat")]), &[], &SilentObserver)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Malformed result"));
    }
}
