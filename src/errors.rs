use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Unrecognized option for {0}: {1}")]
    UnknownOption(String, String),
    #[error("Missing required option for {0}: {1}")]
    MissingOption(String, String),
    #[error("Invalid value for option {name}: \"{value}\" (expected {constraint})")]
    InvalidValue {
        name: String,
        value: String,
        constraint: String,
    },
    #[error("{model} expects {expected} input reference(s), got {given}")]
    InputCount {
        model: String,
        expected: usize,
        given: usize,
    },
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Download failed: {0:#}")]
    Fetch(anyhow::Error),
    #[error("Write failed: {0:#}")]
    Write(anyhow::Error),
}

/// Failures that end an invocation. Every variant maps to its own exit code.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Upload failed for {reference}: {cause:#}")]
    UploadFailed {
        reference: String,
        cause: anyhow::Error,
    },
    #[error("Job failed on {model}: {cause}")]
    JobFailed { model: String, cause: String },
    #[error("None of the {0} artifact(s) could be saved")]
    NothingPersisted(usize),
    #[error("Only {persisted} of {total} artifact(s) were saved")]
    PartialMaterialization { persisted: usize, total: usize },
}

impl GenerationError {
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Validation(_) => "validation",
            Self::UploadFailed { .. } => "staging",
            Self::JobFailed { .. } => "generation",
            Self::NothingPersisted(_) | Self::PartialMaterialization { .. } => "materialization",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) => 3,
            Self::Validation(_) => 4,
            Self::UploadFailed { .. } => 5,
            Self::JobFailed { .. } => 6,
            Self::NothingPersisted(_) | Self::PartialMaterialization { .. } => 7,
        }
    }

    pub fn job_failed(model: &str, cause: impl std::fmt::Display) -> Self {
        Self::JobFailed {
            model: model.to_string(),
            cause: cause.to_string(),
        }
    }
}
