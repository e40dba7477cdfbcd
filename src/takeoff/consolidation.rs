//! Building-level consolidation.
//!
//! Folds the materials of every relevant document into one entry per
//! canonical key. Stateless: each call recomputes from the given list.

use std::collections::HashMap;

use super::material_key::canonical_key;
use super::model::{BuildingSummary, ConsolidatedMaterial, DocumentAnalysis};

/// Consolidate a result list into a building summary.
///
/// Returns `None` when no document is relevant. Materials are visited in
/// document order, then entry order. Entries whose name is missing or empty
/// are skipped; whitespace-only names group under the empty key.
///
/// `weighted_confidence` is a running mean whose divisor is the number of
/// source entries seen before the update, so a document listing the same
/// material twice contributes two samples.
pub fn consolidate(results: &[DocumentAnalysis]) -> Option<BuildingSummary> {
    let relevant: Vec<&DocumentAnalysis> = results.iter().filter(|d| d.is_relevant).collect();
    if relevant.is_empty() {
        return None;
    }

    let mut materials: Vec<ConsolidatedMaterial> = Vec::new();
    let mut index_by_key: HashMap<String, usize> = HashMap::new();
    let mut skipped = 0usize;

    for document in &relevant {
        for entry in &document.materials {
            let Some(key) = canonical_key(entry.name.as_deref()) else {
                skipped += 1;
                continue;
            };

            let area = entry.area_or_zero();
            let confidence = entry.confidence_or_zero();

            match index_by_key.get(&key) {
                Some(&idx) => {
                    let material = &mut materials[idx];
                    let prior_sources = material.source_documents.len() as f64;
                    material.total_area += area;
                    material.weighted_confidence = (material.weighted_confidence * prior_sources
                        + confidence)
                        / (prior_sources + 1.0);
                    material.source_documents.push(document.document_name.clone());
                }
                None => {
                    index_by_key.insert(key.clone(), materials.len());
                    materials.push(ConsolidatedMaterial {
                        canonical_key: key,
                        display_name: entry.name.as_deref().unwrap_or_default().trim().to_string(),
                        code: entry.code.clone().unwrap_or_default(),
                        total_area: area,
                        unit: entry.unit.clone().unwrap_or_default(),
                        weighted_confidence: confidence,
                        source_documents: vec![document.document_name.clone()],
                    });
                }
            }
        }
    }

    if skipped > 0 {
        tracing::debug!("[Consolidation] Skipped {} material entries without a name", skipped);
    }

    let total_area = materials.iter().fold(0.0, |acc, m| acc + m.total_area);

    tracing::debug!(
        "[Consolidation] {} materials across {} relevant documents",
        materials.len(),
        relevant.len()
    );

    Some(BuildingSummary {
        materials,
        total_area,
        relevant_document_count: relevant.len(),
        total_document_count: results.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::takeoff::model::MaterialEntry;

    fn material(name: &str, area: f64, confidence: f64) -> MaterialEntry {
        MaterialEntry {
            name: Some(name.to_string()),
            code: Some("MAT-01".to_string()),
            area: Some(area),
            unit: Some("m2".to_string()),
            confidence: Some(confidence),
            notes: None,
        }
    }

    fn document(name: &str, relevant: bool, materials: Vec<MaterialEntry>) -> DocumentAnalysis {
        DocumentAnalysis {
            document_name: name.to_string(),
            is_relevant: relevant,
            document_kind: "roof_plan".to_string(),
            detected_language: "nl".to_string(),
            scale: "1:100".to_string(),
            material_count: materials.len(),
            materials,
            total_area: Some(100.0),
            validation: None,
        }
    }

    #[test]
    fn test_merges_across_documents() {
        let results = vec![
            document("a.pdf", true, vec![material("EPDM", 50.0, 0.8)]),
            document("b.pdf", true, vec![material(" epdm ", 30.0, 0.6)]),
        ];
        let summary = consolidate(&results).unwrap();

        assert_eq!(summary.materials.len(), 1);
        let epdm = &summary.materials[0];
        assert_eq!(epdm.canonical_key, "epdm");
        assert_eq!(epdm.display_name, "EPDM");
        assert_eq!(epdm.total_area, 80.0);
        assert!((epdm.weighted_confidence - 0.7).abs() < 1e-9);
        assert_eq!(epdm.source_documents, vec!["a.pdf", "b.pdf"]);
        assert_eq!(summary.total_area, 80.0);
        assert_eq!(summary.relevant_document_count, 2);
        assert_eq!(summary.total_document_count, 2);
    }

    #[test]
    fn test_empty_and_irrelevant_yield_none() {
        assert!(consolidate(&[]).is_none());
        assert!(consolidate(&[document("x.pdf", false, vec![material("EPDM", 1.0, 1.0)])]).is_none());
    }

    #[test]
    fn test_irrelevant_documents_are_counted_but_not_aggregated() {
        let results = vec![
            document("a.pdf", true, vec![material("Gravel", 10.0, 0.9)]),
            document("cover.pdf", false, vec![material("Gravel", 999.0, 0.1)]),
        ];
        let summary = consolidate(&results).unwrap();
        assert_eq!(summary.materials[0].total_area, 10.0);
        assert_eq!(summary.relevant_document_count, 1);
        assert_eq!(summary.total_document_count, 2);
    }

    #[test]
    fn test_duplicate_rows_in_one_document_count_as_sources() {
        let results = vec![document(
            "a.pdf",
            true,
            vec![
                material("Insulation", 10.0, 1.0),
                material("insulation", 10.0, 0.4),
                material("INSULATION", 10.0, 0.4),
            ],
        )];
        let summary = consolidate(&results).unwrap();
        let insulation = &summary.materials[0];

        assert_eq!(insulation.source_documents, vec!["a.pdf", "a.pdf", "a.pdf"]);
        assert_eq!(insulation.total_area, 30.0);
        // (1.0 * 1 + 0.4) / 2 = 0.7, then (0.7 * 2 + 0.4) / 3 = 0.6
        assert!((insulation.weighted_confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_whitespace_only_names_group_under_empty_key() {
        let blank = |area| MaterialEntry {
            name: Some("   ".to_string()),
            area: Some(area),
            ..Default::default()
        };
        let results = vec![
            document("a.pdf", true, vec![blank(40.0)]),
            document("b.pdf", true, vec![blank(10.0)]),
        ];
        let summary = consolidate(&results).unwrap();

        assert_eq!(summary.materials.len(), 1);
        assert_eq!(summary.materials[0].canonical_key, "");
        assert_eq!(summary.materials[0].display_name, "");
        assert_eq!(summary.materials[0].total_area, 50.0);
        assert_eq!(summary.total_area, 50.0);
    }

    #[test]
    fn test_relevant_documents_without_materials_total_positive_zero() {
        let results = vec![document("a.pdf", true, Vec::new())];
        let summary = consolidate(&results).unwrap();

        assert!(summary.materials.is_empty());
        assert_eq!(summary.total_area, 0.0);
        assert!(summary.total_area.is_sign_positive());
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let nameless = MaterialEntry {
            name: None,
            area: Some(40.0),
            ..Default::default()
        };
        let empty = MaterialEntry {
            name: Some(String::new()),
            area: Some(40.0),
            ..Default::default()
        };
        let no_numbers = MaterialEntry {
            name: Some("Flashing".to_string()),
            ..Default::default()
        };
        let results = vec![document("a.pdf", true, vec![nameless, empty, no_numbers])];
        let summary = consolidate(&results).unwrap();

        assert_eq!(summary.materials.len(), 1);
        assert_eq!(summary.materials[0].display_name, "Flashing");
        assert_eq!(summary.materials[0].total_area, 0.0);
        assert_eq!(summary.materials[0].weighted_confidence, 0.0);
        assert_eq!(summary.materials[0].code, "");
    }

    #[test]
    fn test_order_is_first_seen() {
        let results = vec![
            document("a.pdf", true, vec![material("Gutter", 5.0, 0.9), material("EPDM", 50.0, 0.8)]),
            document("b.pdf", true, vec![material("Skylight", 2.0, 0.7), material("gutter", 3.0, 0.5)]),
        ];
        let summary = consolidate(&results).unwrap();
        let keys: Vec<&str> = summary.materials.iter().map(|m| m.canonical_key.as_str()).collect();
        assert_eq!(keys, vec!["gutter", "epdm", "skylight"]);
        assert_eq!(summary.total_area, 60.0);
    }

    #[test]
    fn test_recomputation_is_idempotent() {
        let results = vec![document("a.pdf", true, vec![material("EPDM", 50.0, 0.8)])];
        assert_eq!(consolidate(&results), consolidate(&results));
    }
}
