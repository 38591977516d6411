//! Host CPU detection.

use crate::error::{TrainingError, TrainingResult};
use std::path::PathBuf;

/// Reports the host CPU family as a short code name (e.g. `SPR`).
pub trait PlatformDetector {
    fn cpu_type(&self) -> TrainingResult<String>;
}

/// Detector backed by `/proc/cpuinfo`.
#[derive(Debug, Clone)]
pub struct CpuInfoDetector {
    path: PathBuf,
}

impl Default for CpuInfoDetector {
    fn default() -> Self {
        Self { path: PathBuf::from("/proc/cpuinfo") }
    }
}

impl CpuInfoDetector {
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }
}

impl PlatformDetector for CpuInfoDetector {
    fn cpu_type(&self) -> TrainingResult<String> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            TrainingError::Unsupported(format!(
                "CPU detection is not supported on this platform ({}: {e})",
                self.path.display()
            ))
        })?;
        cpu_type_from_cpuinfo(&contents)
    }
}

/// Map the first processor block of a cpuinfo dump to an Intel Xeon code name.
pub fn cpu_type_from_cpuinfo(contents: &str) -> TrainingResult<String> {
    let field = |key: &str| {
        contents
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(k, _)| k.trim() == key)
            .map(|(_, v)| v.trim().to_string())
    };

    let vendor = field("vendor_id").unwrap_or_default();
    if vendor != "GenuineIntel" {
        return Err(TrainingError::Unsupported(format!(
            "Unable to determine the CPU type for vendor '{vendor}'"
        )));
    }

    let family = field("cpu family").and_then(|v| v.parse::<u32>().ok());
    let model = field("model").and_then(|v| v.parse::<u32>().ok());

    let name = match (family, model) {
        (Some(6), Some(85)) => "SKX",
        (Some(6), Some(106 | 108)) => "ICX",
        (Some(6), Some(143)) => "SPR",
        (Some(6), Some(207)) => "EMR",
        (Some(6), Some(173 | 174)) => "GNR",
        (family, model) => {
            return Err(TrainingError::Unsupported(format!(
                "Unrecognized Intel CPU (family {family:?}, model {model:?})"
            )));
        }
    };
    Ok(name.to_string())
}
