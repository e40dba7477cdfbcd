//! Export projections of a finished run.
//!
//! Both projections are pure functions of the result list (and the summary
//! derived from it). Field and row order follow document order, then entry
//! order, so the same input always exports byte-identically.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

use super::model::{BuildingSummary, DocumentAnalysis};
use crate::error::TakeoffError;

/// Lossless structured dump
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredExport<'a> {
    pub exported_at: DateTime<Utc>,
    pub documents: &'a [DocumentAnalysis],
    pub summary: Option<&'a BuildingSummary>,
}

/// Render the structured dump as pretty-printed JSON
pub fn to_structured_json(
    documents: &[DocumentAnalysis],
    summary: Option<&BuildingSummary>,
    exported_at: DateTime<Utc>,
) -> Result<String, TakeoffError> {
    let export = StructuredExport {
        exported_at,
        documents,
        summary,
    };
    serde_json::to_string_pretty(&export).map_err(|e| TakeoffError::Export(e.to_string()))
}

/// One flattened material row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TabularRow {
    pub code: String,
    pub material: String,
    pub area: Option<f64>,
    pub unit: String,
    pub confidence: Option<f64>,
    pub notes: String,
    pub document: String,
}

/// One row per material entry of every relevant document.
/// Entries are exported as-is, including ones consolidation would skip.
pub fn tabular_rows(documents: &[DocumentAnalysis]) -> Vec<TabularRow> {
    documents
        .iter()
        .filter(|d| d.is_relevant)
        .flat_map(|d| {
            d.materials.iter().map(move |m| TabularRow {
                code: m.code.clone().unwrap_or_default(),
                material: m.name.clone().unwrap_or_default(),
                area: m.area,
                unit: m.unit.clone().unwrap_or_default(),
                confidence: m.confidence,
                notes: m.notes.clone().unwrap_or_default(),
                document: d.document_name.clone(),
            })
        })
        .collect()
}

pub const CSV_HEADER: [&str; 7] = ["code", "material", "area", "unit", "confidence", "notes", "document"];

/// Write rows as CSV. The header line is written even when there are no rows.
pub fn write_csv<W: Write>(rows: &[TabularRow], writer: W) -> Result<(), TakeoffError> {
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv_writer
        .write_record(CSV_HEADER)
        .map_err(|e| TakeoffError::Export(e.to_string()))?;
    for row in rows {
        csv_writer
            .serialize(row)
            .map_err(|e| TakeoffError::Export(e.to_string()))?;
    }
    csv_writer
        .flush()
        .map_err(|e| TakeoffError::Export(e.to_string()))
}

/// Convenience: tabular export of a result list as a CSV string
pub fn to_csv_string(documents: &[DocumentAnalysis]) -> Result<String, TakeoffError> {
    let rows = tabular_rows(documents);
    let mut buffer = Vec::new();
    write_csv(&rows, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| TakeoffError::Export(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::takeoff::consolidation::consolidate;
    use crate::takeoff::model::MaterialEntry;
    use chrono::TimeZone;

    fn entry(name: &str, area: f64) -> MaterialEntry {
        MaterialEntry {
            name: Some(name.to_string()),
            code: Some(format!("C-{name}")),
            area: Some(area),
            unit: Some("m2".to_string()),
            confidence: Some(0.9),
            notes: Some("from legend".to_string()),
        }
    }

    fn document(name: &str, relevant: bool, materials: Vec<MaterialEntry>) -> DocumentAnalysis {
        DocumentAnalysis {
            document_name: name.to_string(),
            is_relevant: relevant,
            document_kind: "roof_plan".to_string(),
            detected_language: "en".to_string(),
            scale: "1:50".to_string(),
            material_count: materials.len(),
            materials,
            total_area: Some(42.0),
            validation: None,
        }
    }

    fn sample() -> Vec<DocumentAnalysis> {
        vec![
            document("a.pdf", true, vec![entry("EPDM", 40.0), entry("Gutter", 2.0)]),
            document("cover.pdf", false, vec![entry("Paint", 5.0)]),
            document("b.pdf", true, vec![entry("Gravel", 12.5), MaterialEntry::default()]),
        ]
    }

    #[test]
    fn test_row_count_matches_relevant_entries() {
        let docs = sample();
        let rows = tabular_rows(&docs);
        let expected: usize = docs.iter().filter(|d| d.is_relevant).map(|d| d.materials.len()).sum();
        assert_eq!(rows.len(), expected);
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.document != "cover.pdf"));
    }

    #[test]
    fn test_row_order_is_document_then_entry() {
        let rows = tabular_rows(&sample());
        let names: Vec<&str> = rows.iter().map(|r| r.material.as_str()).collect();
        assert_eq!(names, vec!["EPDM", "Gutter", "Gravel", ""]);
    }

    #[test]
    fn test_csv_output() {
        let csv = to_csv_string(&sample()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("code,material,area,unit,confidence,notes,document"));
        assert_eq!(lines.next(), Some("C-EPDM,EPDM,40.0,m2,0.9,from legend,a.pdf"));
        assert_eq!(csv.lines().count(), 5);
        assert_eq!(csv.lines().last(), Some(",,,,,,b.pdf"));
    }

    #[test]
    fn test_csv_without_relevant_documents_has_header_only() {
        let docs = vec![document("cover.pdf", false, vec![entry("Paint", 5.0)])];
        let csv = to_csv_string(&docs).unwrap();
        assert_eq!(csv, "code,material,area,unit,confidence,notes,document\n");
    }

    #[test]
    fn test_structured_json_is_stable() {
        let docs = sample();
        let summary = consolidate(&docs);
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        let first = to_structured_json(&docs, summary.as_ref(), at).unwrap();
        let second = to_structured_json(&docs, summary.as_ref(), at).unwrap();
        assert_eq!(first, second);

        let value: serde_json::Value = serde_json::from_str(&first).unwrap();
        assert_eq!(value["documents"].as_array().unwrap().len(), 3);
        assert_eq!(value["summary"]["relevantDocumentCount"], 2);
        assert_eq!(value["exportedAt"], "2026-03-01T12:00:00Z");
    }

    #[test]
    fn test_structured_json_round_trips_documents() {
        let docs = sample();
        let json = to_structured_json(&docs, None, Utc::now()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let back: Vec<DocumentAnalysis> = serde_json::from_value(value["documents"].clone()).unwrap();
        assert_eq!(back, docs);
        assert!(value["summary"].is_null());
    }
}
