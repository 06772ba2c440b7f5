//! Redaction helpers for log output.
//!
//! Platform and model credentials travel in headers and occasionally show up
//! in error bodies echoed back by remote services. Anything written through
//! `tracing` or kept for `error_log` goes through these helpers first.

use lazy_static::lazy_static;
use regex::Regex;

const REDACTED: &str = "[REDACTED]";

lazy_static! {
    static ref BEARER_RE: Regex = Regex::new(r"(?i)(bearer\s+)[A-Za-z0-9._\-~+/=]+").unwrap();
    static ref KEY_VALUE_RE: Regex = Regex::new(
        r#"(?i)("?(?:api[_-]?key|token|secret|password|authorization)"?\s*[:=]\s*"?)([^"\s,}]+)"#
    )
    .unwrap();
    static ref OPENAI_KEY_RE: Regex = Regex::new(r"sk-[A-Za-z0-9_\-]{16,}").unwrap();
}

/// Redact bearer tokens, `key=value` style secrets and well-known key formats.
pub fn redact_text_for_logs(text: &str) -> String {
    let out = BEARER_RE.replace_all(text, format!("${{1}}{}", REDACTED));
    let out = KEY_VALUE_RE.replace_all(&out, format!("${{1}}{}", REDACTED));
    let out = OPENAI_KEY_RE.replace_all(&out, REDACTED);
    out.into_owned()
}

/// Redact a known secret value wherever it appears verbatim.
pub fn redact_secret(text: &str, secret: &str) -> String {
    if secret.len() < 4 {
        return text.to_string();
    }
    text.replace(secret, REDACTED)
}

/// Truncate long payloads for single-line log records.
pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{}...", head)
}
