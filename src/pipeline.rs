//! One generation request, start to finish: validate, stage, submit,
//! materialize. Every stage short-circuits the ones after it.

use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use crate::{
    configuration::Settings,
    errors::GenerationError,
    job::{InferenceQueue, JobSubmitter, ProgressObserver, SilentObserver},
    materialize::{self, ArtifactFetcher, MaterializationReport, NamingContext},
    schema::{self, GenerationRequest},
    staging::{self, Uploader},
    utils,
};

/// Everything the pipeline needs from the remote side.
pub trait RemoteService: Uploader + InferenceQueue + ArtifactFetcher {}

impl<T> RemoteService for T where T: Uploader + InferenceQueue + ArtifactFetcher {}

#[derive(Debug)]
pub struct Completed {
    pub request_id: String,
    pub model_id: &'static str,
    pub report: MaterializationReport,
    pub elapsed: Duration,
}

pub struct Pipeline<'a, C: ?Sized> {
    client: &'a C,
    poll_interval: Duration,
    output_root: PathBuf,
    output_dir: Option<PathBuf>,
    observer: &'a dyn ProgressObserver,
}

impl<'a, C> Pipeline<'a, C>
where
    C: RemoteService + ?Sized,
{
    pub fn new(client: &'a C, settings: &Settings) -> Self {
        Self {
            client,
            poll_interval: settings.poll_interval,
            output_root: settings.output_root.clone(),
            output_dir: None,
            observer: &SilentObserver,
        }
    }

    /// Writes artifacts straight into `dir` instead of the model's category
    /// directory under the output root.
    pub fn with_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.output_dir = dir;
        self
    }

    pub fn with_observer(mut self, observer: &'a dyn ProgressObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn output_dir_for(&self, request: &GenerationRequest) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| self.output_root.join(request.schema().output.category))
    }

    pub async fn execute(&self, request: &GenerationRequest) -> Result<Completed, GenerationError> {
        let started = Instant::now();
        let schema = request.schema();
        let options = schema::validate(request.options(), schema)?;
        schema::validate_inputs(schema, request.inputs())?;
        tracing::info!(model = schema.name, options = options.len(), "options validated");

        let staged = staging::stage_all(self.client, request.inputs()).await?;
        tracing::info!(inputs = staged.len(), "inputs staged");

        let timestamp = utils::timestamp_millis();
        let job = JobSubmitter::new(self.client, self.poll_interval)
            .submit(schema, &options, &staged, self.observer)
            .await?;

        let naming = NamingContext::new(request, &options, job.seed, timestamp);
        let output_dir = self.output_dir_for(request);
        let request_id = job.request_id.clone();
        let model_id = job.model_id;
        let report = materialize::materialize(self.client, job, &naming, &output_dir).await;
        tracing::info!(
            persisted = report.persisted(),
            total = report.total(),
            dir = %output_dir.display(),
            "materialization finished"
        );

        Ok(Completed {
            request_id,
            model_id,
            report,
            elapsed: started.elapsed(),
        })
    }
}
