pub mod log_redaction;

pub use log_redaction::{redact_secret, redact_text_for_logs, truncate_for_log};

/// Trim whitespace and one layer of matching surrounding quotes.
///
/// Models frequently wrap plain-text tool inputs in quotes or backticks.
pub fn strip_wrapping_quotes(input: &str) -> &str {
    let trimmed = input.trim();
    for quote in ['"', '\'', '`'] {
        if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
            return trimmed[1..trimmed.len() - 1].trim();
        }
    }
    trimmed
}

/// Remove a surrounding markdown code fence (```json ... ```) if present.
pub fn strip_code_fence(input: &str) -> &str {
    let trimmed = input.trim();
    if !trimmed.starts_with("```") || !trimmed.ends_with("```") || trimmed.len() < 6 {
        return trimmed;
    }
    let inner = &trimmed[3..trimmed.len() - 3];
    // Drop an info string such as `json` on the opening fence line.
    match inner.find('\n') {
        Some(idx) if !inner[..idx].trim().contains(' ') => inner[idx + 1..].trim(),
        _ => inner.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_quotes_once() {
        assert_eq!(strip_wrapping_quotes("  \"dev\" "), "dev");
        assert_eq!(strip_wrapping_quotes("'\"dev\"'"), "\"dev\"");
        assert_eq!(strip_wrapping_quotes("`nginx`"), "nginx");
        assert_eq!(strip_wrapping_quotes("\""), "\"");
    }

    #[test]
    fn strips_code_fences() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
    }
}
