//! Transcript sanitization before prompting.
//!
//! Strips invisible Unicode that could steer the model, drops C0 controls,
//! normalizes whitespace, and caps length. Transcript content is never
//! logged, only counts.

/// Maximum transcript length sent to the inference endpoint (characters).
pub const MAX_TRANSCRIPT_CHARS: usize = 50_000;

/// Sanitize a transcript for inclusion in the extraction prompt.
pub fn sanitize_transcript(raw: &str) -> String {
    let cleaned = remove_invisible_chars(raw);
    let normalized = normalize_whitespace(&cleaned);
    truncate_chars(&normalized, MAX_TRANSCRIPT_CHARS)
}

/// Remove zero-width/formatting characters and C0 controls, preserving
/// ordinary whitespace.
fn remove_invisible_chars(text: &str) -> String {
    text.chars()
        .filter(|c| {
            if matches!(*c, ' ' | '\n' | '\t' | '\r') {
                return true;
            }
            if matches!(
                *c,
                '\u{200B}'..='\u{200F}' // zero-width + directional marks
                | '\u{202A}'..='\u{202E}' // directional embeddings/overrides
                | '\u{2060}'..='\u{2064}' // word joiner + invisible operators
                | '\u{FEFF}' // BOM
            ) {
                return false;
            }
            !c.is_control()
        })
        .collect()
}

/// Collapse runs of blank lines and trim trailing spaces per line.
fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.lines() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(trimmed);
        out.push('\n');
    }
    out.trim_end().to_string()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_zero_width_and_controls() {
        let dirty = "chest\u{200B} pain\u{FEFF}\u{0007} for two days";
        assert_eq!(sanitize_transcript(dirty), "chest pain for two days");
    }

    #[test]
    fn preserves_ordinary_text_and_newlines() {
        let text = "Doctor: hello\nPatient: chest pain";
        assert_eq!(sanitize_transcript(text), text);
    }

    #[test]
    fn collapses_blank_line_runs() {
        let text = "a\n\n\n\nb";
        assert_eq!(sanitize_transcript(text), "a\n\nb");
    }

    #[test]
    fn caps_length() {
        let long = "x".repeat(MAX_TRANSCRIPT_CHARS + 100);
        assert_eq!(sanitize_transcript(&long).chars().count(), MAX_TRANSCRIPT_CHARS);
    }
}
