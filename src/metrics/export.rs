// --- File: src/metrics/export.rs ---

//! Writing metric reports to disk.
//!
//! Layout of an export directory:
//! ```text
//! output_dir/
//! ├── confusion_matrix.json   # ExportFormat::Json
//! └── accuracy.txt            # ExportFormat::Text
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors while exporting a report.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Report file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Pretty-printed JSON.
    #[default]
    Json,
    /// Human readable table.
    Text,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Text => "txt",
        }
    }
}

/// Where and how a metric writes its report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    pub format: ExportFormat,
    /// File name without extension. Defaults to the snake-cased metric name.
    pub file_stem: Option<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("metrics"),
            format: ExportFormat::Json,
            file_stem: None,
        }
    }
}

impl ExportConfig {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn with_format(mut self, format: ExportFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_file_stem(mut self, stem: &str) -> Self {
        self.file_stem = Some(stem.to_string());
        self
    }

    /// Full path of the report for a metric called `metric_name`.
    pub fn report_path(&self, metric_name: &str) -> PathBuf {
        let stem = self
            .file_stem
            .clone()
            .unwrap_or_else(|| snake_case(metric_name));
        self.output_dir
            .join(format!("{}.{}", stem, self.format.extension()))
    }
}

/// Writes `report` according to `config` and returns the written path.
///
/// The output directory is created if it does not exist yet.
pub fn write_report<T>(config: &ExportConfig, metric_name: &str, report: &T) -> Result<PathBuf, ExportError>
where
    T: Serialize + Display,
{
    fs::create_dir_all(&config.output_dir)?;

    let path = config.report_path(metric_name);
    let contents = match config.format {
        ExportFormat::Json => serde_json::to_string_pretty(report)?,
        ExportFormat::Text => report.to_string(),
    };
    let mut file = File::create(&path)?;
    file.write_all(contents.as_bytes())?;

    log::info!("Exported {} report to {}", metric_name, path.display());
    Ok(path)
}

/// `ConfusionMatrix` -> `confusion_matrix`, `top-5 Accuracy` -> `top_5_accuracy`.
fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            prev_lower = false;
        } else if ch.is_alphanumeric() {
            out.push(ch);
            prev_lower = true;
        } else {
            if !out.ends_with('_') && !out.is_empty() {
                out.push('_');
            }
            prev_lower = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Serialize)]
    struct Score {
        value: f64,
    }

    impl fmt::Display for Score {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "score: {:.2}", self.value)
        }
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("ConfusionMatrix"), "confusion_matrix");
        assert_eq!(snake_case("Accuracy"), "accuracy");
        assert_eq!(snake_case("PrecisionRecallCurve"), "precision_recall_curve");
        assert_eq!(snake_case("top-5 Accuracy"), "top_5_accuracy");
    }

    #[test]
    fn test_report_path() {
        let config = ExportConfig::new("/tmp/out").with_format(ExportFormat::Text);
        assert_eq!(
            config.report_path("ConfusionMatrix"),
            PathBuf::from("/tmp/out/confusion_matrix.txt")
        );

        let config = config.with_file_stem("cm_epoch_3");
        assert_eq!(
            config.report_path("ConfusionMatrix"),
            PathBuf::from("/tmp/out/cm_epoch_3.txt")
        );
    }

    #[test]
    fn test_write_report_json_and_text() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("eval").join("epoch_1");
        let score = Score { value: 0.876 };

        let json_path = write_report(&ExportConfig::new(&nested), "Score", &score).unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(parsed["value"], 0.876);

        let text_config = ExportConfig::new(&nested).with_format(ExportFormat::Text);
        let text_path = write_report(&text_config, "Score", &score).unwrap();
        assert_eq!(fs::read_to_string(text_path).unwrap(), "score: 0.88");
    }

    #[test]
    fn test_export_config_from_json() {
        let config: ExportConfig =
            serde_json::from_str(r#"{ "output_dir": "reports", "format": "text" }"#).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("reports"));
        assert_eq!(config.format, ExportFormat::Text);
        assert_eq!(config.file_stem, None);
    }
}
