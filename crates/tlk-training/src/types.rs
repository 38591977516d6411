use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Deep-learning framework a model or dataset belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameworkType {
    #[serde(rename = "tensorflow")]
    TensorFlow,
    #[serde(rename = "pytorch")]
    PyTorch,
}

impl FrameworkType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TensorFlow => "tensorflow",
            Self::PyTorch => "pytorch",
        }
    }

    /// File name of the serialized model that identifies this framework.
    #[must_use]
    pub fn model_artifact(self) -> &'static str {
        match self {
            Self::TensorFlow => "saved_model.pb",
            Self::PyTorch => "model.pt",
        }
    }

    #[must_use]
    pub fn all() -> [Self; 2] {
        [Self::TensorFlow, Self::PyTorch]
    }
}

impl fmt::Display for FrameworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrameworkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tensorflow" | "tf" => Ok(Self::TensorFlow),
            "pytorch" | "torch" => Ok(Self::PyTorch),
            other => Err(format!("unsupported framework: {other}")),
        }
    }
}

/// Task category a model addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UseCaseType {
    ImageClassification,
    TextClassification,
}

impl UseCaseType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ImageClassification => "image_classification",
            Self::TextClassification => "text_classification",
        }
    }
}

impl fmt::Display for UseCaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UseCaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "image_classification" | "ic" => Ok(Self::ImageClassification),
            "text_classification" | "tc" => Ok(Self::TextClassification),
            other => Err(format!("unsupported use case: {other}")),
        }
    }
}
