//! Runtime configuration
//!
//! Defaults live on each component's config struct. `TakeoffConfig::from_env`
//! loads `.env` (if present) and overrides them from the environment:
//!
//! | Variable                          | Field                                  |
//! |-----------------------------------|----------------------------------------|
//! | `ANTHROPIC_API_KEY`               | interpreter API key (required to run)  |
//! | `TAKEOFF_MODEL`                   | interpreter model                      |
//! | `TAKEOFF_BASE_URL`                | interpreter base URL                   |
//! | `TAKEOFF_INTERPRET_TIMEOUT_SECS`  | interpretation timeout                 |
//! | `TAKEOFF_AREA_SCRIPT`             | area calculator script path            |
//! | `TAKEOFF_PYTHON`                  | area calculator interpreter            |
//! | `TAKEOFF_ESTIMATOR_TIMEOUT_SECS`  | estimator timeout                      |
//! | `TAKEOFF_TOLERANCE_PERCENT`       | validation tolerance                   |
//! | `TAKEOFF_CONTEXT_MODE`            | `full_cross_reference` / `sequential`  |
//! | `TAKEOFF_CONTEXT_ENABLED`         | sequential digest on/off               |

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::ai::client::HttpInterpreter;
use crate::ai::context::ContextMode;
use crate::ai::orchestrator::{AnalysisOrchestrator, BatchRequest, OrchestratorConfig};
use crate::ai::types::InterpreterConfig;
use crate::error::TakeoffError;
use crate::takeoff::model::DocumentInput;
use crate::vision::estimator::{EstimatorConfig, ScriptAreaEstimator};

/// Complete configuration for a take-off service
#[derive(Debug, Clone)]
pub struct TakeoffConfig {
    pub interpreter: InterpreterConfig,
    pub estimator: EstimatorConfig,
    pub orchestrator: OrchestratorConfig,
    pub mode: ContextMode,
    pub context_enabled: bool,
}

impl Default for TakeoffConfig {
    fn default() -> Self {
        let orchestrator = OrchestratorConfig::default();
        let interpreter = InterpreterConfig {
            request_timeout: orchestrator.interpretation_timeout,
            ..Default::default()
        };
        let estimator = EstimatorConfig {
            timeout: orchestrator.estimator_timeout,
            ..Default::default()
        };

        Self {
            interpreter,
            estimator,
            orchestrator,
            mode: ContextMode::default(),
            context_enabled: true,
        }
    }
}

impl TakeoffConfig {
    /// Defaults overridden by `.env` and the process environment
    pub fn from_env() -> Result<Self, TakeoffError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!("[Config] Failed to load .env: {}", e);
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns. Blank values are
    /// ignored.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TakeoffError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(key) = get("ANTHROPIC_API_KEY") {
            config.interpreter.api_key = key;
        }
        if let Some(model) = get("TAKEOFF_MODEL") {
            config.interpreter.model = model;
        }
        if let Some(url) = get("TAKEOFF_BASE_URL") {
            config.interpreter.base_url = url;
        }
        if let Some(secs) = get("TAKEOFF_INTERPRET_TIMEOUT_SECS") {
            let timeout = parse_secs("TAKEOFF_INTERPRET_TIMEOUT_SECS", &secs)?;
            config.interpreter.request_timeout = timeout;
            config.orchestrator.interpretation_timeout = timeout;
        }

        if let Some(script) = get("TAKEOFF_AREA_SCRIPT") {
            config.estimator.script_path = PathBuf::from(script);
        }
        if let Some(python) = get("TAKEOFF_PYTHON") {
            config.estimator.interpreter = python;
        }
        if let Some(secs) = get("TAKEOFF_ESTIMATOR_TIMEOUT_SECS") {
            let timeout = parse_secs("TAKEOFF_ESTIMATOR_TIMEOUT_SECS", &secs)?;
            config.estimator.timeout = timeout;
            config.orchestrator.estimator_timeout = timeout;
        }

        if let Some(tolerance) = get("TAKEOFF_TOLERANCE_PERCENT") {
            let value: f64 = parse_value("TAKEOFF_TOLERANCE_PERCENT", &tolerance)?;
            if !value.is_finite() || value < 0.0 {
                return Err(TakeoffError::Config(format!(
                    "TAKEOFF_TOLERANCE_PERCENT must be a non-negative number, got '{}'",
                    tolerance
                )));
            }
            config.orchestrator.tolerance_percent = value;
        }

        if let Some(mode) = get("TAKEOFF_CONTEXT_MODE") {
            config.mode = ContextMode::from_str(&mode).ok_or_else(|| {
                TakeoffError::Config(format!("Unknown TAKEOFF_CONTEXT_MODE '{}'", mode))
            })?;
        }
        if let Some(enabled) = get("TAKEOFF_CONTEXT_ENABLED") {
            config.context_enabled = parse_bool("TAKEOFF_CONTEXT_ENABLED", &enabled)?;
        }

        Ok(config)
    }

    /// Orchestrator wired to the HTTP interpreter and the script estimator.
    /// The estimator is probed at the start of every run, so a missing
    /// calculator only disables secondary validation.
    pub fn build_orchestrator(&self) -> Result<AnalysisOrchestrator, TakeoffError> {
        let interpreter = HttpInterpreter::new(self.interpreter.clone())
            .map_err(|e| TakeoffError::Config(e.to_string()))?;
        let estimator = ScriptAreaEstimator::new(self.estimator.clone());

        Ok(AnalysisOrchestrator::new(Arc::new(interpreter), self.orchestrator.clone())
            .with_estimator(Arc::new(estimator)))
    }

    /// Batch request using the configured context mode
    pub fn batch_request(
        &self,
        documents: Vec<DocumentInput>,
        context_documents: Vec<DocumentInput>,
    ) -> BatchRequest {
        BatchRequest::new(documents, self.mode)
            .with_context_documents(context_documents, self.context_enabled)
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, TakeoffError> {
    value
        .parse()
        .map_err(|_| TakeoffError::Config(format!("{} has an invalid value '{}'", key, value)))
}

fn parse_secs(key: &str, value: &str) -> Result<Duration, TakeoffError> {
    let secs: u64 = parse_value(key, value)?;
    if secs == 0 {
        return Err(TakeoffError::Config(format!("{} must be greater than zero", key)));
    }
    Ok(Duration::from_secs(secs))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, TakeoffError> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(TakeoffError::Config(format!("{} has an invalid value '{}'", key, value))),
    }
}
