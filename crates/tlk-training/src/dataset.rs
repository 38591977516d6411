use crate::error::{TrainingError, TrainingResult};
use crate::types::{FrameworkType, UseCaseType};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_BATCH_SIZE: u32 = 32;

/// File name of the descriptor written by [`DatasetHandle::save`].
pub const DATASET_DESCRIPTOR: &str = "dataset.json";

/// Layout of the dataset on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DatasetKind {
    /// One subdirectory per class, images inside.
    ImageFolder { class_names: Vec<String> },
    /// A delimited text file with label and text columns.
    Csv { file: PathBuf },
}

/// A loaded dataset, owned by a single training or quantization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetHandle {
    pub root: PathBuf,
    pub use_case: UseCaseType,
    pub framework: FrameworkType,
    pub batch_size: u32,
    pub kind: DatasetKind,
}

impl DatasetHandle {
    /// Load a dataset from a directory for a use case and framework.
    pub fn from_directory(
        root: &Path,
        use_case: UseCaseType,
        framework: FrameworkType,
    ) -> TrainingResult<Self> {
        if !root.is_dir() {
            return Err(TrainingError::DirectoryNotFound(root.to_path_buf()));
        }

        let kind = match use_case {
            UseCaseType::ImageClassification => DatasetKind::ImageFolder {
                class_names: scan_class_dirs(root)?,
            },
            UseCaseType::TextClassification => DatasetKind::Csv { file: find_csv(root)? },
        };

        Ok(Self {
            root: root.to_path_buf(),
            use_case,
            framework,
            batch_size: DEFAULT_BATCH_SIZE,
            kind,
        })
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn class_names(&self) -> &[String] {
        match &self.kind {
            DatasetKind::ImageFolder { class_names } => class_names,
            DatasetKind::Csv { .. } => &[],
        }
    }

    /// True when the dataset can describe itself to the compression engine.
    #[must_use]
    pub fn is_image_folder(&self) -> bool {
        matches!(self.kind, DatasetKind::ImageFolder { .. })
    }

    /// Snapshot this handle into `dir` so another process can load it.
    pub fn save(&self, dir: &Path) -> TrainingResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(DATASET_DESCRIPTOR);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    /// Load a handle previously written with [`DatasetHandle::save`].
    pub fn load(dir: &Path) -> TrainingResult<Self> {
        let path = dir.join(DATASET_DESCRIPTOR);
        let bytes = std::fs::read(&path).map_err(|e| {
            TrainingError::Dataset(format!("failed to read {}: {e}", path.display()))
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn scan_class_dirs(root: &Path) -> TrainingResult<Vec<String>> {
    let mut classes = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        classes.push(name);
    }

    if classes.is_empty() {
        return Err(TrainingError::Dataset(format!(
            "no class subdirectories found in {}",
            root.display()
        )));
    }

    classes.sort();
    Ok(classes)
}

fn find_csv(root: &Path) -> TrainingResult<PathBuf> {
    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let path = entry?.path();
        let is_delimited = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| matches!(ext.to_lowercase().as_str(), "csv" | "tsv"));
        if path.is_file() && is_delimited {
            candidates.push(path);
        }
    }

    candidates.sort();
    candidates.into_iter().next().ok_or_else(|| {
        TrainingError::Dataset(format!("no .csv or .tsv file found in {}", root.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_image_folder_lists_sorted_classes() {
        let temp = TempDir::new().unwrap();
        for class in ["tulips", "daisy", ".cache"] {
            std::fs::create_dir_all(temp.path().join(class)).unwrap();
        }
        std::fs::write(temp.path().join("LICENSE.txt"), "cc-by").unwrap();

        let ds = DatasetHandle::from_directory(
            temp.path(),
            UseCaseType::ImageClassification,
            FrameworkType::TensorFlow,
        )
        .unwrap();

        assert_eq!(ds.class_names(), ["daisy".to_string(), "tulips".to_string()]);
        assert_eq!(ds.batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn test_image_folder_requires_classes() {
        let temp = TempDir::new().unwrap();
        let err = DatasetHandle::from_directory(
            temp.path(),
            UseCaseType::ImageClassification,
            FrameworkType::TensorFlow,
        )
        .unwrap_err();
        assert!(matches!(err, TrainingError::Dataset(_)));
    }

    #[test]
    fn test_text_dataset_picks_csv() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("reviews.csv"), "label,text\n1,great\n").unwrap();

        let ds = DatasetHandle::from_directory(
            temp.path(),
            UseCaseType::TextClassification,
            FrameworkType::PyTorch,
        )
        .unwrap();
        assert_eq!(ds.kind, DatasetKind::Csv { file: temp.path().join("reviews.csv") });
        assert!(!ds.is_image_folder());
    }

    #[test]
    fn test_save_and_load_descriptor() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("data").join("roses")).unwrap();
        let ds = DatasetHandle::from_directory(
            &temp.path().join("data"),
            UseCaseType::ImageClassification,
            FrameworkType::TensorFlow,
        )
        .unwrap()
        .with_batch_size(64);

        let snapshot = temp.path().join("train_data");
        ds.save(&snapshot).unwrap();
        assert_eq!(DatasetHandle::load(&snapshot).unwrap(), ds);
    }
}
