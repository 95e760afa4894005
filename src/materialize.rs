//! Downloads job artifacts and persists them under deterministic names.

use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::fs;

use crate::{
    errors::ArtifactError,
    job::{Artifact, Job},
    schema::{FileLabel, GenerationRequest, ValidatedOptions},
    utils,
};

#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> anyhow::Result<Vec<u8>>;
}

/// Everything needed to name the artifacts of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct NamingContext {
    pub stem: String,
    pub prefix: Option<&'static str>,
    pub label: Option<&'static str>,
    pub timestamp: i64,
    pub seed: Option<u64>,
    pub default_extension: &'static str,
}

impl NamingContext {
    pub fn new(
        request: &GenerationRequest,
        options: &ValidatedOptions,
        job_seed: Option<u64>,
        timestamp: i64,
    ) -> Self {
        let layout = &request.schema().output;
        let stem = match request.inputs().first() {
            Some(reference) => utils::reference_stem(reference),
            None => utils::prompt_slug(options.text("prompt").unwrap_or_default()),
        };
        let label = match layout.label {
            FileLabel::None => None,
            FileLabel::Fixed(label) => Some(label),
            FileLabel::WhenFlag {
                option,
                when_set,
                otherwise,
            } => Some(if options.flag(option).unwrap_or_default() {
                when_set
            } else {
                otherwise
            }),
        };
        let seed = if layout.seed_in_name {
            job_seed.or_else(|| {
                options
                    .integer("seed")
                    .and_then(|seed| u64::try_from(seed).ok())
            })
        } else {
            None
        };
        Self {
            stem,
            prefix: layout.prefix,
            label,
            timestamp,
            seed,
            default_extension: layout.extension,
        }
    }

    /// `<prefix_><stem>_<label_><timestamp><_seedN><_index>.<ext>`; the index
    /// suffix only appears from the second artifact on.
    pub fn file_name(&self, index: usize, artifact: &Artifact) -> String {
        let mut name = String::new();
        if let Some(prefix) = self.prefix {
            name.push_str(prefix);
            name.push('_');
        }
        name.push_str(&self.stem);
        name.push('_');
        if let Some(label) = self.label {
            name.push_str(label);
            name.push('_');
        }
        name.push_str(&self.timestamp.to_string());
        if let Some(seed) = self.seed {
            name.push_str(&format!("_seed{seed}"));
        }
        if index > 0 {
            name.push_str(&format!("_{index}"));
        }
        let extension = artifact
            .content_type
            .as_deref()
            .and_then(utils::extension_for_content_type)
            .unwrap_or(self.default_extension);
        format!("{name}.{extension}")
    }
}

#[derive(Debug)]
pub struct ArtifactOutcome {
    pub index: usize,
    pub artifact: Artifact,
    pub result: Result<PathBuf, ArtifactError>,
}

#[derive(Debug, Default)]
pub struct MaterializationReport {
    pub entries: Vec<ArtifactOutcome>,
}

impl MaterializationReport {
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    pub fn persisted(&self) -> usize {
        self.entries.iter().filter(|e| e.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.persisted()
    }

    pub fn paths(&self) -> Vec<&Path> {
        self.entries
            .iter()
            .filter_map(|e| e.result.as_ref().ok().map(PathBuf::as_path))
            .collect()
    }

    /// Safety warnings. These never make an artifact fail.
    pub fn warnings(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.artifact.nsfw == Some(true))
            .map(|e| {
                format!(
                    "Artifact {} was flagged as possibly containing restricted content",
                    e.index + 1
                )
            })
            .collect()
    }
}

/// `path` itself, or the first `<stem>-<n>.<ext>` (n from 2) not on disk yet.
async fn vacant_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|extension| extension.to_string_lossy().into_owned());
    let mut candidate = path.to_path_buf();
    let mut counter = 2;
    while fs::try_exists(&candidate).await.unwrap_or(false) {
        let name = match &extension {
            Some(extension) => format!("{stem}-{counter}.{extension}"),
            None => format!("{stem}-{counter}"),
        };
        candidate = path.with_file_name(name);
        counter += 1;
    }
    candidate
}

async fn persist<F>(
    fetcher: &F,
    artifact: &Artifact,
    path: &Path,
) -> Result<PathBuf, ArtifactError>
where
    F: ArtifactFetcher + ?Sized,
{
    let bytes = fetcher
        .fetch(&artifact.url)
        .await
        .map_err(ArtifactError::Fetch)?;

    let partial = path.with_file_name(format!(
        "{}.part",
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    ));
    let written = async {
        fs::write(&partial, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", partial.display()))?;
        let target = vacant_path(path).await;
        fs::rename(&partial, &target)
            .await
            .with_context(|| format!("Failed to move {} into place", partial.display()))?;
        anyhow::Ok(target)
    }
    .await;
    let target = match written {
        Ok(target) => target,
        Err(e) => {
            let _ = fs::remove_file(&partial).await;
            return Err(ArtifactError::Write(e));
        }
    };
    tracing::info!(path = %target.display(), bytes = bytes.len(), "artifact saved");
    Ok(target)
}

/// Fetches and writes every artifact of `job` into `output_dir`.
///
/// Downloads run concurrently; the report keeps the job's artifact order and
/// records each outcome independently.
pub async fn materialize<F>(
    fetcher: &F,
    job: Job,
    naming: &NamingContext,
    output_dir: &Path,
) -> MaterializationReport
where
    F: ArtifactFetcher + ?Sized,
{
    let dir_error = fs::create_dir_all(output_dir)
        .await
        .err()
        .map(|e| format!("Failed to create {}: {e}", output_dir.display()));

    let pending = job
        .artifacts
        .into_iter()
        .enumerate()
        .map(|(index, artifact)| {
            let path = output_dir.join(naming.file_name(index, &artifact));
            let dir_error = dir_error.clone();
            async move {
                let result = match dir_error {
                    Some(message) => Err(ArtifactError::Write(anyhow!(message))),
                    None => persist(fetcher, &artifact, &path).await,
                };
                ArtifactOutcome {
                    index,
                    artifact,
                    result,
                }
            }
        });

    let mut entries = join_all(pending).await;
    entries.sort_by_key(|entry| entry.index);
    MaterializationReport { entries }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{collections::HashSet, sync::Mutex, time::Duration};

    use anyhow::bail;

    use super::*;
    use crate::{
        job::JobStatus,
        schema::{RawOptions, find, validate},
    };

    /// Serves `payload:<url>` for every URL, failing those listed.
    #[derive(Default)]
    pub(crate) struct FakeFetcher {
        pub failing: HashSet<String>,
        pub fetched: Mutex<Vec<String>>,
        pub delay_first: bool,
    }

    #[async_trait]
    impl ArtifactFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> anyhow::Result<Vec<u8>> {
            if self.delay_first && url.ends_with("/0") {
                tokio::time::sleep(Duration::from_millis(30)).await;
            }
            self.fetched.lock().unwrap().push(url.to_string());
            if self.failing.contains(url) {
                bail!("404 Not Found");
            }
            Ok(format!("payload:{url}").into_bytes())
        }
    }

    fn artifact(url: &str, content_type: Option<&str>) -> Artifact {
        Artifact {
            url: url.to_string(),
            content_type: content_type.map(ToString::to_string),
            file_name: None,
            file_size: None,
            width: None,
            height: None,
            duration: None,
            fps: None,
            num_frames: None,
            nsfw: None,
        }
    }

    fn job_with(count: usize) -> Job {
        Job {
            request_id: "req".into(),
            model_id: "fal-ai/test",
            status: JobStatus::Succeeded,
            artifacts: (0..count)
                .map(|i| artifact(&format!("https://cdn/{i}"), Some("image/png")))
                .collect(),
            seed: None,
        }
    }

    fn naming() -> NamingContext {
        NamingContext {
            stem: "a_beautiful_sunset".into(),
            prefix: None,
            label: None,
            timestamp: 1_700_000_000_000,
            seed: None,
            default_extension: "png",
        }
    }

    fn build_request(
        name: &str,
        inputs: &[&str],
        pairs: &[(&str, &str)],
    ) -> (GenerationRequest, ValidatedOptions) {
        let schema = find(name).unwrap();
        let raw = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<RawOptions>();
        let options = validate(&raw, schema).unwrap();
        let request = GenerationRequest::new(
            schema,
            inputs.iter().map(ToString::to_string).collect(),
            raw,
        );
        (request, options)
    }

    #[test]
    fn single_prompt_artifact_has_timestamp_and_no_index() {
        let (request, options) =
            build_request("t2i-qwen-image", &[], &[("prompt", "A beautiful sunset")]);
        let naming = NamingContext::new(&request, &options, None, 1_700_000_000_000);
        assert_eq!(
            naming.file_name(0, &artifact("https://cdn/x", None)),
            "a_beautiful_sunset_1700000000000.png"
        );
    }

    #[test]
    fn names_follow_the_schema_layout() {
        let (request, options) =
            build_request("t2i-nano-banana-pro", &[], &[("prompt", "A cat"), ("seed", "7")]);
        let naming = NamingContext::new(&request, &options, None, 5);
        assert_eq!(
            naming.file_name(2, &artifact("u", Some("image/jpeg"))),
            "nano_banana_a_cat_5_seed7_2.jpg"
        );

        let (request, options) = build_request(
            "i2i-qwen-image-edit",
            &["inputs/portrait.png"],
            &[("prompt", "glasses")],
        );
        let naming = NamingContext::new(&request, &options, Some(99), 5);
        assert_eq!(naming.file_name(0, &artifact("u", None)), "portrait_edited_5.png");

        let (request, options) = build_request("i2v-ltx-2-audio", &["scene.jpg"], &[]);
        let naming = NamingContext::new(&request, &options, None, 5);
        assert_eq!(
            naming.file_name(0, &artifact("u", Some("video/mp4"))),
            "scene_audio_video_5.mp4"
        );

        let (request, options) =
            build_request("i2v-ltx-2-audio", &["scene.jpg"], &[("generate_audio", "false")]);
        let naming = NamingContext::new(&request, &options, None, 5);
        assert_eq!(
            naming.file_name(0, &artifact("u", Some("video/webm"))),
            "scene_video_5.webm"
        );
    }

    #[tokio::test]
    async fn writes_every_artifact_under_distinct_names() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("images").join("generated");
        let fetcher = FakeFetcher {
            delay_first: true,
            ..Default::default()
        };

        let report = materialize(&fetcher, job_with(3), &naming(), &out).await;

        assert_eq!(report.total(), 3);
        assert_eq!(report.persisted(), 3);
        let indices = report.entries.iter().map(|e| e.index).collect::<Vec<_>>();
        assert_eq!(indices, vec![0, 1, 2]);
        let paths = report.paths();
        let unique = paths.iter().collect::<HashSet<_>>();
        assert_eq!(unique.len(), 3);
        assert_eq!(std::fs::read(paths[1])?, b"payload:https://cdn/1");
        let leftovers = std::fs::read_dir(&out)?
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .count();
        assert_eq!(leftovers, 0);
        Ok(())
    }

    #[tokio::test]
    async fn one_failed_download_does_not_stop_the_rest() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let fetcher = FakeFetcher {
            failing: HashSet::from(["https://cdn/1".to_string()]),
            ..Default::default()
        };

        let report = materialize(&fetcher, job_with(3), &naming(), dir.path()).await;

        assert_eq!(report.total(), 3);
        assert_eq!(report.failed(), 1);
        assert!(matches!(report.entries[1].result, Err(ArtifactError::Fetch(_))));
        assert!(report.entries[0].result.is_ok());
        assert!(report.entries[2].result.is_ok());
        assert_eq!(fetcher.fetched.lock().unwrap().len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn unwritable_directory_fails_each_artifact() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let blocker = dir.path().join("occupied");
        std::fs::write(&blocker, b"file, not a directory")?;

        let out = blocker.join("out");
        let report = materialize(&FakeFetcher::default(), job_with(2), &naming(), &out).await;

        assert_eq!(report.persisted(), 0);
        assert!(
            report
                .entries
                .iter()
                .all(|e| matches!(e.result, Err(ArtifactError::Write(_))))
        );
        Ok(())
    }

    #[tokio::test]
    async fn existing_file_with_the_same_name_is_kept() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let taken = dir.path().join("a_beautiful_sunset_1700000000000.png");
        std::fs::write(&taken, b"earlier run")?;
        std::fs::write(
            dir.path().join("a_beautiful_sunset_1700000000000-2.png"),
            b"even earlier run",
        )?;

        let report = materialize(&FakeFetcher::default(), job_with(1), &naming(), dir.path()).await;

        assert_eq!(report.persisted(), 1);
        let saved = report.paths()[0].to_path_buf();
        assert_eq!(saved, dir.path().join("a_beautiful_sunset_1700000000000-3.png"));
        assert_eq!(std::fs::read(&saved)?, b"payload:https://cdn/0");
        assert_eq!(std::fs::read(&taken)?, b"earlier run");
        Ok(())
    }

    #[tokio::test]
    async fn safety_flag_is_a_warning_not_a_failure() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut job = job_with(2);
        job.artifacts[1].nsfw = Some(true);

        let report = materialize(&FakeFetcher::default(), job, &naming(), dir.path()).await;

        assert_eq!(report.persisted(), 2);
        assert_eq!(report.warnings().len(), 1);
        assert!(report.warnings()[0].contains("Artifact 2"));
        Ok(())
    }
}
