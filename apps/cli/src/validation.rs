//! Argument value parsers. A rejected value makes clap exit with status 2.

use std::path::PathBuf;
use tlk_training::{verify_directory, BenchmarkMode, FrameworkType, UseCaseType};

/// A directory that must already exist.
pub fn existing_dir(value: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(value);
    verify_directory(&path, true).map_err(|e| e.to_string())?;
    Ok(path)
}

/// A directory that is created when missing.
pub fn output_dir(value: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(value);
    if path.exists() && !path.is_dir() {
        return Err(format!("'{value}' is not a directory"));
    }
    Ok(path)
}

pub fn positive_int(value: &str) -> Result<u32, String> {
    match value.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("'{value}' is not a valid integer >= 1")),
    }
}

pub fn non_negative_int(value: &str) -> Result<u64, String> {
    value.trim().parse::<u64>().map_err(|_| format!("'{value}' is not a valid integer >= 0"))
}

pub fn unit_interval(value: &str) -> Result<f64, String> {
    match value.trim().parse::<f64>() {
        Ok(x) if (0.0..=1.0).contains(&x) => Ok(x),
        Ok(_) => Err(format!("{value} is not in the range 0<=x<=1")),
        Err(_) => Err(format!("'{value}' is not a valid float")),
    }
}

pub fn framework(value: &str) -> Result<FrameworkType, String> {
    value.parse()
}

pub fn use_case(value: &str) -> Result<UseCaseType, String> {
    value.parse()
}

pub fn benchmark_mode(value: &str) -> Result<BenchmarkMode, String> {
    value.parse().map_err(|e: tlk_training::TrainingError| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_int() {
        assert_eq!(positive_int("50"), Ok(50));
        for bad in ["0", "-1", "-5", "foo", "1.5"] {
            assert!(positive_int(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_non_negative_int() {
        assert_eq!(non_negative_int("0"), Ok(0));
        assert!(non_negative_int("-1").is_err());
        assert!(non_negative_int("foo").is_err());
    }

    #[test]
    fn test_unit_interval() {
        assert_eq!(unit_interval("0.01"), Ok(0.01));
        assert_eq!(unit_interval("1"), Ok(1.0));
        for bad in ["1.3", "-5", "foo", "NaN"] {
            assert!(unit_interval(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_existing_dir_message() {
        let err = existing_dir("/definitely/not/here").unwrap_err();
        assert_eq!(err, "Directory '/definitely/not/here' does not exist");
    }
}
