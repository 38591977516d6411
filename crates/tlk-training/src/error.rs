use std::path::PathBuf;
use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("{0}")]
    TypeMismatch(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("Directory '{}' does not exist", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    FileExists(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("compression engine error: {0}")]
    Engine(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TrainingError {
    /// True for errors caused by bad caller input rather than by the model,
    /// the dataset or an external service.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidValue(_) | Self::DirectoryNotFound(_) | Self::NotADirectory(_))
    }
}
