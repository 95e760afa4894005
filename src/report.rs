//! Console side of an invocation: progress display while the job runs and
//! the final verdict with its exit code.

use std::{future::Future, sync::Mutex, time::Duration};

use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressStyle};

use crate::{
    errors::GenerationError,
    job::{Artifact, JobStatus, ProgressObserver},
    pipeline::Completed,
    utils,
};

/// Shows the job state on a spinner and prints remote log lines above it.
pub struct ConsoleObserver {
    progress: MultiProgress,
    spinner: Mutex<Option<ProgressBar>>,
}

impl ConsoleObserver {
    pub fn new(progress: MultiProgress) -> Self {
        Self {
            progress,
            spinner: Mutex::new(None),
        }
    }

    fn spinner(&self) -> ProgressBar {
        let mut slot = self.spinner.lock().unwrap_or_else(|e| e.into_inner());
        slot.get_or_insert_with(|| {
            let pb = self.progress.add(ProgressBar::new_spinner());
            if let Ok(style) =
                ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed}]")
            {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(120));
            pb
        })
        .clone()
    }
}

impl ProgressObserver for ConsoleObserver {
    fn on_status(&self, request_id: &str, status: JobStatus, queue_position: Option<u32>) {
        if status.is_terminal() {
            if let Some(pb) = self.spinner.lock().unwrap_or_else(|e| e.into_inner()).take() {
                pb.finish_and_clear();
                self.progress.remove(&pb);
            }
            self.progress.suspend(|| println!("Job {request_id} {status}."));
            return;
        }
        let message = match queue_position {
            Some(position) => format!("Job {request_id} {status}, position {position} in queue"),
            None => format!("Job {request_id} {status}"),
        };
        self.spinner().set_message(message);
    }

    fn on_log(&self, line: &str) {
        self.progress.suspend(|| println!("{line}"));
    }
}

/// One printed line and the stream it goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Out(String),
    Err(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitOutcome {
    pub code: u8,
    /// Lines in print order, so per-artifact results keep artifact order.
    pub lines: Vec<OutputLine>,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    pub fn stdout(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                OutputLine::Out(text) => Some(text.as_str()),
                OutputLine::Err(_) => None,
            })
            .collect()
    }

    pub fn stderr(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                OutputLine::Err(text) => Some(text.as_str()),
                OutputLine::Out(_) => None,
            })
            .collect()
    }

    pub fn emit(&self) {
        for line in &self.lines {
            match line {
                OutputLine::Out(text) => println!("{text}"),
                OutputLine::Err(text) => eprintln!("{text}"),
            }
        }
    }
}

/// Decides whether a finished materialization counts as success.
pub fn verdict(completed: &Completed, strict: bool) -> Result<(), GenerationError> {
    let report = &completed.report;
    if report.persisted() == 0 {
        return Err(GenerationError::NothingPersisted(report.total()));
    }
    if strict && report.failed() > 0 {
        return Err(GenerationError::PartialMaterialization {
            persisted: report.persisted(),
            total: report.total(),
        });
    }
    Ok(())
}

fn error_line(error: &GenerationError) -> OutputLine {
    OutputLine::Err(format!("[{}] {error}", error.stage()))
}

/// Whatever metadata the service reported, e.g. `1280x720, video/mp4, 6.0s, 25 fps`.
fn artifact_details(artifact: &Artifact) -> Option<String> {
    let mut details = Vec::new();
    if let Some((width, height)) = artifact.dimensions() {
        details.push(format!("{width}x{height}"));
    }
    if let Some(content_type) = &artifact.content_type {
        details.push(content_type.clone());
    }
    if let Some(duration) = artifact.duration {
        details.push(format!("{duration:.1}s"));
    }
    if let Some(fps) = artifact.fps {
        details.push(format!("{fps} fps"));
    }
    if let Some(frames) = artifact.num_frames {
        details.push(format!("{frames} frames"));
    }
    if let Some(size) = artifact.file_size {
        details.push(HumanBytes(size).to_string());
    }
    (!details.is_empty()).then(|| details.join(", "))
}

/// Folds the outcome of a pipeline run into printable lines and an exit code.
pub fn summarize(result: Result<Completed, GenerationError>, strict: bool) -> ExitOutcome {
    let completed = match result {
        Ok(completed) => completed,
        Err(error) => {
            tracing::error!(stage = error.stage(), error = %error, "generation failed");
            return ExitOutcome {
                code: error.exit_code(),
                lines: vec![error_line(&error)],
            };
        }
    };

    let report = &completed.report;
    let mut lines = Vec::new();
    for entry in &report.entries {
        let position = format!("[{}/{}]", entry.index + 1, report.total());
        match &entry.result {
            Ok(path) => lines.push(OutputLine::Out(match artifact_details(&entry.artifact) {
                Some(details) => format!("{position} Saved {} ({details})", path.display()),
                None => format!("{position} Saved {}", path.display()),
            })),
            Err(e) => lines.push(OutputLine::Err(format!(
                "{position} {} not saved: {e}",
                entry.artifact.url
            ))),
        }
    }
    for warning in report.warnings() {
        lines.push(OutputLine::Err(format!("Warning: {warning}")));
    }

    let code = match verdict(&completed, strict) {
        Ok(()) => {
            lines.push(OutputLine::Out(format!(
                "Saved {} of {} artifact(s) from {} in {}.",
                report.persisted(),
                report.total(),
                completed.request_id,
                utils::duration_to_sec_string(&completed.elapsed)
            )));
            0
        }
        Err(error) => {
            lines.push(error_line(&error));
            error.exit_code()
        }
    };
    ExitOutcome { code, lines }
}

/// Runs the whole pipeline as one scoped execution and reports on it.
pub async fn run<F>(pipeline: F, strict: bool) -> ExitOutcome
where
    F: Future<Output = Result<Completed, GenerationError>>,
{
    let outcome = summarize(pipeline.await, strict);
    outcome.emit();
    outcome
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use anyhow::anyhow;

    use super::*;
    use crate::{
        errors::{ArtifactError, ValidationError},
        materialize::{ArtifactOutcome, MaterializationReport},
    };

    fn artifact(index: usize, nsfw: Option<bool>) -> Artifact {
        Artifact {
            url: format!("https://cdn/{index}"),
            content_type: None,
            file_name: None,
            file_size: None,
            width: None,
            height: None,
            duration: None,
            fps: None,
            num_frames: None,
            nsfw,
        }
    }

    fn completed(outcomes: &[bool]) -> Completed {
        let entries = outcomes
            .iter()
            .enumerate()
            .map(|(index, ok)| ArtifactOutcome {
                index,
                artifact: artifact(index, None),
                result: if *ok {
                    Ok(PathBuf::from(format!("out/{index}.png")))
                } else {
                    Err(ArtifactError::Fetch(anyhow!("404 Not Found")))
                },
            })
            .collect();
        Completed {
            request_id: "req-9".into(),
            model_id: "fal-ai/test",
            report: MaterializationReport { entries },
            elapsed: Duration::from_millis(12_340),
        }
    }

    #[test]
    fn full_success_exits_zero() {
        let outcome = summarize(Ok(completed(&[true, true])), false);
        assert!(outcome.success());
        let stdout = outcome.stdout();
        assert_eq!(stdout.len(), 3);
        assert_eq!(stdout[0], "[1/2] Saved out/0.png");
        assert_eq!(stdout[2], "Saved 2 of 2 artifact(s) from req-9 in 12.3s.");
        assert!(outcome.stderr().is_empty());
    }

    #[test]
    fn partial_success_lists_each_artifact_and_exits_zero() {
        let outcome = summarize(Ok(completed(&[true, false, true])), false);
        assert_eq!(outcome.code, 0);
        let stderr = outcome.stderr();
        assert!(outcome.stdout()[0].contains("Saved out/0.png"));
        assert!(stderr[0].contains("https://cdn/1"));
        assert!(stderr[0].contains("404 Not Found"));
        assert!(outcome.stdout().last().unwrap().contains("Saved 2 of 3"));
    }

    #[test]
    fn artifact_lines_keep_artifact_order_across_streams() {
        let outcome = summarize(Ok(completed(&[true, false, true])), false);
        assert_eq!(
            &outcome.lines[..3],
            [
                OutputLine::Out("[1/3] Saved out/0.png".into()),
                OutputLine::Err(
                    "[2/3] https://cdn/1 not saved: Download failed: 404 Not Found".into()
                ),
                OutputLine::Out("[3/3] Saved out/2.png".into()),
            ]
        );
    }

    #[test]
    fn saved_line_shows_reported_metadata() {
        let mut completed = completed(&[true]);
        let artifact = &mut completed.report.entries[0].artifact;
        artifact.width = Some(1280);
        artifact.height = Some(720);
        artifact.content_type = Some("video/mp4".into());
        artifact.duration = Some(6.0);
        artifact.fps = Some(25.0);
        artifact.num_frames = Some(145);
        let outcome = summarize(Ok(completed), false);
        assert_eq!(
            outcome.stdout()[0],
            "[1/1] Saved out/0.png (1280x720, video/mp4, 6.0s, 25 fps, 145 frames)"
        );
    }

    #[test]
    fn file_size_is_human_readable() {
        let mut completed = completed(&[true]);
        completed.report.entries[0].artifact.file_size = Some(2048);
        let outcome = summarize(Ok(completed), false);
        assert_eq!(outcome.stdout()[0], "[1/1] Saved out/0.png (2.00 KiB)");
    }

    #[test]
    fn strict_mode_fails_partial_success() {
        let outcome = summarize(Ok(completed(&[true, false])), true);
        assert_eq!(outcome.code, 7);
        assert!(outcome.stderr().last().unwrap().contains("Only 1 of 2"));
    }

    #[test]
    fn nothing_persisted_is_a_failure() {
        let outcome = summarize(Ok(completed(&[false, false])), false);
        assert_eq!(outcome.code, 7);
        assert!(outcome.stderr().last().unwrap().starts_with("[materialization]"));
    }

    #[test]
    fn errors_carry_their_stage_and_code() {
        let outcome = summarize(
            Err(GenerationError::Validation(ValidationError::InvalidValue {
                name: "duration".into(),
                value: "7".into(),
                constraint: "one of 6, 8".into(),
            })),
            false,
        );
        assert_eq!(outcome.code, 4);
        assert!(outcome.stdout().is_empty());
        assert!(outcome.stderr()[0].starts_with("[validation]"));
        assert!(outcome.stderr()[0].contains("duration"));
    }

    #[test]
    fn safety_flag_is_printed_as_warning() {
        let mut completed = completed(&[true]);
        completed.report.entries[0].artifact.nsfw = Some(true);
        let outcome = summarize(Ok(completed), false);
        assert!(outcome.success());
        assert!(outcome.stderr()[0].starts_with("Warning:"));
    }

    #[tokio::test]
    async fn run_awaits_the_pipeline() {
        let outcome = run(async { Err(GenerationError::job_failed("m", "boom")) }, false).await;
        assert_eq!(outcome.code, 6);
    }
}
