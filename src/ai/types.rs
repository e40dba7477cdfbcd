//! Shared types for the interpretation layer

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::takeoff::model::{DocumentAnalysis, MaterialEntry, ValidationRecord};

/// What the interpretation engine returns for one document: a
/// [`DocumentAnalysis`] without its validation record.
///
/// Every field except `totalArea` is required on the wire (`materials` may
/// be empty). A response missing any of them is a schema failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterpretedDocument {
    pub document_name: String,
    pub is_relevant: bool,
    pub document_kind: String,
    pub detected_language: String,
    pub scale: String,
    pub materials: Vec<MaterialEntry>,
    pub total_area: Option<f64>,
    pub material_count: usize,
}

impl InterpretedDocument {
    /// Finish the record. The batch's display name wins over whatever name
    /// the engine read off the drawing, since documents are identified by
    /// upload, not by title block.
    pub fn into_analysis(
        self,
        display_name: &str,
        validation: Option<ValidationRecord>,
    ) -> DocumentAnalysis {
        let document_name = if display_name.trim().is_empty() {
            self.document_name
        } else {
            display_name.to_string()
        };

        DocumentAnalysis {
            document_name,
            is_relevant: self.is_relevant,
            document_kind: self.document_kind,
            detected_language: self.detected_language,
            scale: self.scale,
            materials: self.materials,
            total_area: self.total_area,
            material_count: self.material_count,
            validation,
        }
    }
}

/// Configuration for the HTTP interpretation engine
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// API key for the Messages API
    pub api_key: String,

    /// Base URL for API (default: https://api.anthropic.com)
    pub base_url: String,

    pub model: String,

    pub max_tokens: u32,

    /// HTTP request timeout
    pub request_timeout: Duration,

    /// Retries on 429 and transport errors, with doubling backoff
    pub max_retries: u32,

    pub initial_backoff: Duration,

    /// Rate limit: requests per second
    pub requests_per_second: f32,

    /// Rate limit: max concurrent requests
    pub max_concurrent_requests: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 8192,
            request_timeout: Duration::from_secs(180),
            max_retries: 3,
            initial_backoff: Duration::from_secs(2),
            requests_per_second: 1.0,
            max_concurrent_requests: 1,
        }
    }
}

/// Progress notification emitted after each completed document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Zero-based index of the document that just completed
    pub index: usize,
    pub total: usize,
    pub document_name: String,
}
