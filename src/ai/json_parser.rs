use serde::de::DeserializeOwned;

/// Extracts and parses a JSON object from a model response.
///
/// Tries, in order: the whole response, the body of a fenced code block, and
/// the outermost balanced `{ ... }` found by brace counting (string-aware,
/// so braces inside string values do not confuse it). On failure the error
/// carries the last serde message, which names the offending field when the
/// response is valid JSON of the wrong shape.
pub fn extract_json<T: DeserializeOwned>(response: &str) -> Result<T, String> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err("empty response".to_string());
    }

    let fenced = strip_code_fence(trimmed);
    let candidates = [
        Some(trimmed),
        fenced,
        fenced.and_then(find_json_object),
        find_json_object(trimmed),
    ];

    let mut last_error: Option<String> = None;
    for candidate in candidates.into_iter().flatten() {
        match serde_json::from_str::<T>(candidate) {
            Ok(parsed) => return Ok(parsed),
            Err(e) if e.is_data() => last_error = Some(e.to_string()),
            Err(e) => {
                if last_error.is_none() {
                    last_error = Some(e.to_string());
                }
            }
        }
    }

    Err(format!(
        "{} (response preview: {}...)",
        last_error.unwrap_or_else(|| "no JSON object found".to_string()),
        trimmed.chars().take(200).collect::<String>()
    ))
}

/// Body of the first ```json / ``` fenced block, if any
fn strip_code_fence(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_ticks = &text[start + 3..];
    // Skip the info string ("json", "JSON", ...) up to the newline
    let body_start = after_ticks.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_ticks[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

/// Find the outermost JSON object using brace counting
fn find_json_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut start_idx: Option<usize> = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' if start_idx.is_some() => in_string = true,
            '{' => {
                if depth == 0 {
                    start_idx = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(start) = start_idx {
                        return Some(&text[start..=i]);
                    }
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Sheet {
        document_kind: String,
        materials: Vec<String>,
    }

    #[test]
    fn test_pure_json() {
        let input = r#"{"documentKind": "roof_plan", "materials": []}"#;
        let sheet: Sheet = extract_json(input).unwrap();
        assert_eq!(sheet.document_kind, "roof_plan");
    }

    #[test]
    fn test_markdown_code_block() {
        let input = "Here is the analysis:\n```json\n{\"documentKind\": \"section\", \"materials\": [\"EPDM\"]}\n```\nDone.";
        let sheet: Sheet = extract_json(input).unwrap();
        assert_eq!(sheet.materials, vec!["EPDM"]);
    }

    #[test]
    fn test_json_with_text_around() {
        let input = r#"Sure. {"documentKind": "detail", "materials": ["a } b"]} Hope that helps."#;
        let sheet: Sheet = extract_json(input).unwrap();
        assert_eq!(sheet.materials, vec!["a } b"]);
    }

    #[test]
    fn test_schema_error_names_field() {
        let input = r#"{"documentKind": "detail"}"#;
        let err = extract_json::<Sheet>(input).unwrap_err();
        assert!(err.contains("materials"), "{err}");
    }

    #[test]
    fn test_no_json() {
        assert!(extract_json::<Sheet>("I could not read this drawing.").is_err());
        assert_eq!(extract_json::<Sheet>("   ").unwrap_err(), "empty response");
    }
}
