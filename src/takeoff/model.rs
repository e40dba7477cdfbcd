//! Take-off data model
//!
//! Records produced per document by the interpretation engine, the
//! validation verdict attached to them, and the building-level summary
//! derived from a result list.

use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One uploaded document. Identity is its position in the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInput {
    /// Display name (usually the uploaded filename)
    pub name: String,

    /// Raw document bytes, base64 when serialized
    #[serde(serialize_with = "encode_base64", deserialize_with = "decode_base64")]
    pub content: Vec<u8>,
}

impl DocumentInput {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// MIME type sniffed from magic bytes. Unknown content is treated as PDF,
    /// the only format the upload surface accepts besides raster scans.
    pub fn media_type(&self) -> &'static str {
        detect_media_type(&self.content)
    }

    pub fn is_pdf(&self) -> bool {
        self.media_type() == "application/pdf"
    }
}

/// Detect document MIME type from magic bytes
pub fn detect_media_type(data: &[u8]) -> &'static str {
    if data.starts_with(b"%PDF") {
        "application/pdf"
    } else if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        "image/png"
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if data.starts_with(b"RIFF") && data.get(8..12) == Some(b"WEBP") {
        "image/webp"
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        "image/gif"
    } else {
        "application/pdf"
    }
}

fn encode_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
}

fn decode_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    base64::engine::general_purpose::STANDARD
        .decode(encoded.as_bytes())
        .map_err(serde::de::Error::custom)
}

// ---------------------------------------------------------------------------
// Per-document analysis
// ---------------------------------------------------------------------------

/// One detected material on one document.
///
/// Upstream engines occasionally emit nulls or wrongly typed values here, so
/// every field is read leniently: anything that is not the expected JSON type
/// becomes `None`. Consolidation decides what to do with incomplete entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,

    /// Canonical material code (e.g. a product or spec section code)
    #[serde(default, deserialize_with = "lenient_string")]
    pub code: Option<String>,

    #[serde(default, deserialize_with = "lenient_number")]
    pub area: Option<f64>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub unit: Option<String>,

    #[serde(default, deserialize_with = "lenient_number")]
    pub confidence: Option<f64>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub notes: Option<String>,
}

impl MaterialEntry {
    /// Area usable for summation: non-finite or negative values count as 0.
    pub fn area_or_zero(&self) -> f64 {
        match self.area {
            Some(area) if area.is_finite() && area > 0.0 => area,
            _ => 0.0,
        }
    }

    /// Confidence clamped into [0, 1], missing or non-finite as 0.
    pub fn confidence_or_zero(&self) -> f64 {
        match self.confidence {
            Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
            _ => 0.0,
        }
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        _ => None,
    })
}

fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

/// Full analysis of one document. Immutable once the orchestrator appends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAnalysis {
    pub document_name: String,

    /// Whether the document contains roofing material of interest.
    /// Irrelevant documents are kept for display but never aggregated.
    pub is_relevant: bool,

    /// Engine classification, e.g. "floor_plan", "roof_plan", "specification"
    pub document_kind: String,

    pub detected_language: String,

    /// Drawing scale as printed, e.g. "1:100"
    pub scale: String,

    pub materials: Vec<MaterialEntry>,

    /// Primary (engine-derived) area estimate in square meters
    pub total_area: Option<f64>,

    pub material_count: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationRecord>,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Which area figure a reviewer should trust
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    UsePrimary,
    UseSecondary,
    ManualReview,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UsePrimary => "use_primary",
            Self::UseSecondary => "use_secondary",
            Self::ManualReview => "manual_review",
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict of reconciling the primary and secondary area estimates.
///
/// Invariant: `secondary_used == false` implies `recommendation == UsePrimary`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRecord {
    pub secondary_used: bool,
    pub primary_area: f64,
    pub secondary_area: Option<f64>,
    pub absolute_delta: f64,
    pub percent_delta: f64,
    pub recommendation: Recommendation,
    pub message: String,

    /// Shape classification reported by the vision estimator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape_label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_confidence: Option<f64>,
}

impl ValidationRecord {
    /// Record for a document validated against nothing
    pub fn primary_only(primary_area: f64, message: impl Into<String>) -> Self {
        Self {
            secondary_used: false,
            primary_area,
            secondary_area: None,
            absolute_delta: 0.0,
            percent_delta: 0.0,
            recommendation: Recommendation::UsePrimary,
            message: message.into(),
            shape_label: None,
            secondary_confidence: None,
        }
    }

    /// The area figure the recommendation points at. Manual review keeps the
    /// primary figure until a person decides.
    pub fn recommended_area(&self) -> f64 {
        match (self.recommendation, self.secondary_area) {
            (Recommendation::UseSecondary, Some(area)) => area,
            _ => self.primary_area,
        }
    }
}

/// Secondary area estimate from the vision estimator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaEstimate {
    /// Area in square meters
    pub area: f64,

    /// e.g. "rectangle", "L-shape (detected)", "complex"
    pub shape_label: String,

    pub shape_is_simple_rectangle: bool,

    pub confidence: f64,

    #[serde(default)]
    pub sections: Vec<AreaSection>,
}

/// One rectangular or irregular section the estimator decomposed the outline into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaSection {
    pub name: String,
    #[serde(default)]
    pub width_m: Option<f64>,
    #[serde(default)]
    pub height_m: Option<f64>,
    #[serde(default)]
    pub area_m2: Option<f64>,
    #[serde(default)]
    pub note: Option<String>,
}

// ---------------------------------------------------------------------------
// Consolidation
// ---------------------------------------------------------------------------

/// One material grouped across every relevant document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedMaterial {
    pub canonical_key: String,
    pub display_name: String,
    pub code: String,
    pub total_area: f64,
    pub unit: String,
    pub weighted_confidence: f64,

    /// Contributing documents in first-seen order. A document appears once
    /// per contributing entry.
    pub source_documents: Vec<String>,
}

/// Building-level totals, always a pure function of a result list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingSummary {
    pub materials: Vec<ConsolidatedMaterial>,
    pub total_area: f64,
    pub relevant_document_count: usize,
    pub total_document_count: usize,
}
