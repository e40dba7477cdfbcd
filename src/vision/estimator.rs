//! Script-backed area estimator
//!
//! Runs the computer-vision area calculator as a subprocess:
//!
//! ```text
//! <interpreter> <script> <document.pdf> --scale 1:100
//! ```
//!
//! The calculator prints one JSON object on stdout, on success and failure
//! alike (the exit code is 1 on failure, so it is not relied on).

use async_trait::async_trait;
use serde::Deserialize;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

use crate::ai::engine::AreaEstimator;
use crate::error::EstimatorError;
use crate::takeoff::model::{AreaEstimate, AreaSection, DocumentInput};

/// Configuration for the area calculator subprocess
#[derive(Debug, Clone)]
pub struct EstimatorConfig {
    /// Interpreter used to launch the script
    pub interpreter: String,

    /// Path to the area calculator script
    pub script_path: PathBuf,

    /// Per-call timeout. Kept well below the interpretation timeout.
    pub timeout: Duration,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            script_path: PathBuf::from("services/areaCalculator.py"),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Area estimator backed by the external calculator script
pub struct ScriptAreaEstimator {
    config: EstimatorConfig,
}

impl ScriptAreaEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    async fn run_calculator(
        &self,
        document: &DocumentInput,
        scale_hint: &str,
    ) -> Result<AreaEstimate, EstimatorError> {
        // The calculator only reads from disk
        let suffix = if document.is_pdf() { ".pdf" } else { ".img" };
        let mut scratch = tempfile::Builder::new()
            .prefix("takeoff-")
            .suffix(suffix)
            .tempfile()
            .map_err(|e| EstimatorError::Failed(format!("Failed to create scratch file: {}", e)))?;
        scratch
            .write_all(&document.content)
            .and_then(|_| scratch.flush())
            .map_err(|e| EstimatorError::Failed(format!("Failed to write scratch file: {}", e)))?;

        let mut command = Command::new(&self.config.interpreter);
        command
            .arg(&self.config.script_path)
            .arg(scratch.path())
            .arg("--scale")
            .arg(scale_hint)
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.config.timeout, command.output())
            .await
            .map_err(|_| EstimatorError::Timeout {
                seconds: self.config.timeout.as_secs(),
            })?
            .map_err(|e| EstimatorError::Failed(format!("Failed to launch calculator: {}", e)))?;

        if !output.status.success() {
            tracing::debug!(
                status = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "[Vision] Calculator exited unsuccessfully"
            );
        }

        parse_calculator_output(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl AreaEstimator for ScriptAreaEstimator {
    async fn is_available(&self) -> bool {
        if !self.config.script_path.is_file() {
            tracing::debug!(
                "[Vision] Calculator script not found: {}",
                self.config.script_path.display()
            );
            return false;
        }

        // Only spawnability matters here, not the probe's exit status
        let probe = Command::new(&self.config.interpreter)
            .arg("--version")
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.config.timeout, probe).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::debug!("[Vision] Interpreter '{}' not launchable: {}", self.config.interpreter, e);
                false
            }
            Err(_) => false,
        }
    }

    async fn estimate_area(
        &self,
        document: &DocumentInput,
        scale_hint: &str,
    ) -> Result<AreaEstimate, EstimatorError> {
        tracing::debug!("[Vision] Estimating area of {} at {}", document.name, scale_hint);
        self.run_calculator(document, scale_hint).await
    }
}

#[derive(Deserialize)]
struct CalculatorOutput {
    success: bool,
    #[serde(default)]
    total_area_m2: Option<f64>,
    #[serde(default)]
    shape_type: Option<String>,
    #[serde(default)]
    is_simple_rectangle: bool,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    sections: Vec<CalculatorSection>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct CalculatorSection {
    name: String,
    #[serde(default)]
    width_m: Option<f64>,
    #[serde(default)]
    height_m: Option<f64>,
    #[serde(default)]
    area_m2: Option<f64>,
    #[serde(default)]
    note: Option<String>,
}

/// Map the calculator's stdout into an estimate
fn parse_calculator_output(stdout: &str) -> Result<AreaEstimate, EstimatorError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(EstimatorError::Malformed("no output".to_string()));
    }

    let raw: CalculatorOutput = serde_json::from_str(trimmed)
        .map_err(|e| EstimatorError::Malformed(e.to_string()))?;

    if !raw.success {
        let reason = match (raw.message, raw.error) {
            (Some(message), Some(error)) => format!("{}: {}", message, error),
            (Some(message), None) => message,
            (None, Some(error)) => error,
            (None, None) => "unknown failure".to_string(),
        };
        return Err(EstimatorError::Failed(reason));
    }

    let area = match raw.total_area_m2 {
        Some(area) if area.is_finite() && area > 0.0 => area,
        other => {
            return Err(EstimatorError::Malformed(format!(
                "unusable total_area_m2: {:?}",
                other
            )))
        }
    };

    Ok(AreaEstimate {
        area,
        shape_label: raw.shape_type.unwrap_or_else(|| "unknown".to_string()),
        shape_is_simple_rectangle: raw.is_simple_rectangle,
        confidence: raw.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
        sections: raw
            .sections
            .into_iter()
            .map(|s| AreaSection {
                name: s.name,
                width_m: s.width_m,
                height_m: s.height_m,
                area_m2: s.area_m2,
                note: s.note,
            })
            .collect(),
    })
}
