use crate::error::{TrainingError, TrainingResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

static INVALID_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_.\-]+").expect("valid regex"));

/// Stage subtree for derived model artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStage {
    Quantized,
    Optimized,
}

impl OutputStage {
    #[must_use]
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Quantized => "quantized",
            Self::Optimized => "optimized",
        }
    }
}

/// Filesystem layout for exported and derived models under a user output directory.
///
/// Plain exports go to `<root>/<model_name>/<n>`, derived models to
/// `<root>/<stage>/<model_name>/<n>`.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn export_model_dir(&self, model_name: &str) -> TrainingResult<PathBuf> {
        Ok(self.root.join(validate_model_name(model_name)?))
    }

    pub fn stage_model_dir(&self, stage: OutputStage, model_name: &str) -> TrainingResult<PathBuf> {
        Ok(self.root.join(stage.dir_name()).join(validate_model_name(model_name)?))
    }

    /// Next numbered directory for a plain export. Not created.
    pub fn next_export_dir(&self, model_name: &str) -> TrainingResult<PathBuf> {
        next_version_dir(&self.export_model_dir(model_name)?)
    }

    /// Next numbered directory under a stage subtree. Not created.
    pub fn next_stage_dir(&self, stage: OutputStage, model_name: &str) -> TrainingResult<PathBuf> {
        next_version_dir(&self.stage_model_dir(stage, model_name)?)
    }
}

/// Verify a directory path.
///
/// An existing non-directory is always an error. A missing directory is an
/// error when `require_exists` is set, otherwise it is created.
pub fn verify_directory(path: &Path, require_exists: bool) -> TrainingResult<()> {
    if path.exists() {
        if !path.is_dir() {
            return Err(TrainingError::NotADirectory(path.to_path_buf()));
        }
        return Ok(());
    }

    if require_exists {
        return Err(TrainingError::DirectoryNotFound(path.to_path_buf()));
    }

    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Normalize a model name into something safe to use as a directory name.
///
/// Runs of characters outside `[A-Za-z0-9_.-]` collapse into a single `_`
/// (hub URLs and `org/model` names become flat names).
pub fn validate_model_name(model_name: &str) -> TrainingResult<String> {
    let trimmed = model_name.trim().trim_end_matches('/');
    let normalized = INVALID_NAME_CHARS.replace_all(trimmed, "_").trim_matches('_').to_string();

    if normalized.is_empty() || normalized.chars().all(|c| c == '.') {
        return Err(TrainingError::InvalidValue(format!("invalid model name: '{model_name}'")));
    }
    Ok(normalized)
}

/// Count the positive integer-named subdirectories of `dir`.
///
/// A missing directory counts as zero.
pub fn count_version_dirs(dir: &Path) -> TrainingResult<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut count = 0;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let is_version = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<u64>().ok())
            .is_some_and(|n| n > 0);
        if is_version {
            count += 1;
        }
    }
    Ok(count)
}

/// Next versioned directory under `parent`: `1 + count of numbered subdirectories`.
///
/// The directory is listed right before use with no locking, so two processes
/// writing into the same parent can pick the same number.
pub fn next_version_dir(parent: &Path) -> TrainingResult<PathBuf> {
    let version = count_version_dirs(parent)? + 1;
    let dir = parent.join(version.to_string());
    debug!(path = %dir.display(), version, "Selected versioned output directory");
    Ok(dir)
}

/// True when `dir` is missing or has no entries.
pub fn is_empty_dir(dir: &Path) -> TrainingResult<bool> {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => Ok(entries.next().is_none()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e.into()),
    }
}

/// Recursively copy `src` into `dst`, optionally skipping top-level entries by name.
pub fn copy_dir(src: &Path, dst: &Path, skip_top_level: &[&str]) -> TrainingResult<()> {
    std::fs::create_dir_all(dst)?;

    for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| TrainingError::Io(e.into()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| TrainingError::Other(e.into()))?;

        let top = rel.components().next().and_then(|c| c.as_os_str().to_str());
        if top.is_some_and(|name| skip_top_level.contains(&name)) {
            continue;
        }

        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
