//! Tolerant payload parsing: pull the outermost balanced JSON object out of
//! a response that may contain incidental prose or markdown fences.

use serde_json::Value;

use super::ExtractionError;

/// Extract and parse the JSON payload from a raw inference response.
pub fn parse_json_payload(response: &str) -> Result<Value, ExtractionError> {
    let candidate = extract_outermost_object(response).ok_or(ExtractionError::NoJsonPayload)?;
    serde_json::from_str(candidate).map_err(|e| ExtractionError::JsonParsing(e.to_string()))
}

/// Locate the outermost balanced `{ ... }` in free text.
///
/// Brace counting is string-aware: braces inside JSON string literals
/// (including escaped quotes) do not affect the balance. Returns the first
/// balanced object; text before and after is ignored, which also covers
/// ```json fences without special-casing them.
pub fn extract_outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else {
                match byte {
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
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

    #[test]
    fn parses_bare_object() {
        let value = parse_json_payload(r#"{"version": "2.0"}"#).unwrap();
        assert_eq!(value["version"], "2.0");
    }

    #[test]
    fn skips_surrounding_prose() {
        let response = r#"Here is the extraction you asked for:

{"version": "2.0", "metadata": {"setting_type": "clinic"}}

Let me know if you need anything else."#;
        let value = parse_json_payload(response).unwrap();
        assert_eq!(value["metadata"]["setting_type"], "clinic");
    }

    #[test]
    fn handles_markdown_fences() {
        let response = "```json\n{\"version\": \"2.0\"}\n```";
        let value = parse_json_payload(response).unwrap();
        assert_eq!(value["version"], "2.0");
    }

    #[test]
    fn braces_inside_strings_do_not_unbalance() {
        let response = r#"{"notes": "use {caution} here", "nested": {"a": "}"}}"#;
        let value = parse_json_payload(response).unwrap();
        assert_eq!(value["notes"], "use {caution} here");
        assert_eq!(value["nested"]["a"], "}");
    }

    #[test]
    fn escaped_quotes_inside_strings() {
        let response = r#"{"quote": "the doctor said \"rest\" today"}"#;
        let value = parse_json_payload(response).unwrap();
        assert_eq!(value["quote"], "the doctor said \"rest\" today");
    }

    #[test]
    fn no_object_is_an_error() {
        let err = parse_json_payload("no json here at all").unwrap_err();
        assert!(matches!(err, ExtractionError::NoJsonPayload));
    }

    #[test]
    fn unterminated_object_is_an_error() {
        let err = parse_json_payload(r#"{"version": "2.0""#).unwrap_err();
        assert!(matches!(err, ExtractionError::NoJsonPayload));
    }

    #[test]
    fn invalid_json_inside_balanced_braces() {
        let err = parse_json_payload("{not valid json}").unwrap_err();
        assert!(matches!(err, ExtractionError::JsonParsing(_)));
    }

    #[test]
    fn takes_first_object_when_several_present() {
        let response = r#"{"first": 1} and then {"second": 2}"#;
        let value = parse_json_payload(response).unwrap();
        assert_eq!(value["first"], 1);
    }
}
