use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};

/// Optimizer identity plus constructor arguments.
///
/// The class is stored instead of an instance so a worker process can build
/// its own optimizer from the same description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerSpec {
    pub class_name: OptimizerClass,
    pub learning_rate: f64,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerClass {
    Adam,
    AdamW,
    #[serde(rename = "SGD")]
    Sgd,
    #[serde(rename = "RMSprop")]
    RmsProp,
    Adagrad,
}

impl OptimizerSpec {
    #[must_use]
    pub fn new(class_name: OptimizerClass, learning_rate: f64) -> Self {
        Self { class_name, learning_rate, args: serde_json::Value::Null }
    }

    pub fn validate(&self) -> TrainingResult<()> {
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(TrainingError::InvalidValue("learning_rate must be > 0".to_string()));
        }
        if !(self.args.is_null() || self.args.is_object()) {
            return Err(TrainingError::TypeMismatch(
                "optimizer args must be a JSON object of constructor keyword arguments".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loss identity plus constructor arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossSpec {
    pub class_name: LossClass,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossClass {
    SparseCategoricalCrossentropy,
    CategoricalCrossentropy,
    BinaryCrossentropy,
    MeanSquaredError,
}

impl LossSpec {
    #[must_use]
    pub fn new(class_name: LossClass, args: serde_json::Value) -> Self {
        Self { class_name, args }
    }

    pub fn validate(&self) -> TrainingResult<()> {
        if !(self.args.is_null() || self.args.is_object()) {
            return Err(TrainingError::TypeMismatch(
                "loss args must be a JSON object of constructor keyword arguments".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for LossSpec {
    fn default() -> Self {
        Self::new(LossClass::SparseCategoricalCrossentropy, serde_json::json!({"from_logits": true}))
    }
}

/// Per-model runtime switches handed to the framework runtime with every call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeOptions {
    pub seed: Option<u64>,
    pub auto_mixed_precision: bool,
}
