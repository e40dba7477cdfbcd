//! Interpretation prompt text and the response schema contract.

/// System prompt for the interpretation engine
pub const INTERPRETATION_SYSTEM_PROMPT: &str = r#"You are an expert quantity surveyor specialised in roofing. You read scanned construction documents (floor plans, roof plans, sections, details, specifications, bills of quantities) and produce a material take-off for the roof.

Rules:
- Only roofing-related material counts (membranes, insulation, vapour control layers, ballast, flashings, gutters, skylights, roof drains, edge trims, decking).
- A document with no roofing content is NOT relevant: set "isRelevant" to false and return an empty "materials" list.
- Areas are in square meters unless the document states otherwise; put the unit you used in "unit".
- Derive areas from dimensions and the drawing scale. When a roof outline is not a simple rectangle, decompose it into rectangles and sum them.
- Never invent materials that are not on the document. Use "notes" to record assumptions.
- Confidence is a number between 0 and 1 reflecting how certain you are of the material and its area.
- Reference documents are context only. Take-off the LAST document, not the references.

Respond with a single JSON object and nothing else."#;

/// JSON shape every interpretation must match
pub const RESPONSE_SCHEMA: &str = r#"{
  "documentName": "title or drawing number as printed on the document",
  "isRelevant": true,
  "documentKind": "one of: floor_plan, roof_plan, section, elevation, detail, specification, bill_of_quantities, other",
  "detectedLanguage": "ISO 639-1 code, e.g. nl, en, de",
  "scale": "drawing scale as printed, e.g. 1:100 (empty string if none)",
  "materials": [
    {
      "name": "EPDM membrane 1.5mm",
      "code": "manufacturer or specification code, empty string if none",
      "area": 245.5,
      "unit": "m2",
      "confidence": 0.85,
      "notes": "derived from roof outline 18.2 x 13.5 m"
    }
  ],
  "totalArea": 245.5,
  "materialCount": 1
}"#;

/// Build the instruction text that follows the attached documents
pub fn build_interpretation_prompt(
    target_name: &str,
    reference_names: &[&str],
    context_digest: &str,
) -> String {
    let mut prompt = String::new();

    if !reference_names.is_empty() {
        prompt.push_str(&format!(
            "## Reference documents ({})\nThe first {} attached document(s) belong to the same building and are provided for cross-referencing only:\n",
            reference_names.len(),
            reference_names.len()
        ));
        for name in reference_names {
            prompt.push_str(&format!("- {}\n", name));
        }
        prompt.push('\n');
    }

    if !context_digest.trim().is_empty() {
        prompt.push_str("## Results so far\n");
        prompt.push_str(context_digest.trim_end());
        prompt.push_str("\n\nUse these results for consistency (same material names, same scale conventions). Do not copy their quantities.\n\n");
    }

    prompt.push_str(&format!(
        "## Document to analyze\nThe LAST attached document: {}\n\nReturn exactly this JSON shape:\n{}\n",
        target_name, RESPONSE_SCHEMA
    ));

    prompt
}
