//! Fixed user-facing strings.
//!
//! Kept in one place so the console, the approval prompt and the capabilities
//! agree on wording. Strings with `{}`/`{name}` placeholders are rendered by
//! the helpers below.

pub const WELCOME: &str = "deckhand: What can I help?";
pub const REASONING_HEADER: &str = "deckhand reasoning:";
pub const RESPONSE_PREFIX: &str = "deckhand: ";
pub const INFORM_PREFIX: &str = "deckhand[inform]: ";
pub const ERROR_OCCURRED: &str =
    "An internal error occurred. Enter 'error_log' if you want to see the details.";
pub const REJECTED: &str = "The action is rejected.";
pub const NO_ERROR: &str = "No error occurred.";
pub const INTERRUPTED: &str = "Interrupted.";
pub const RESOURCE_LOG_PREFIX: &str = "Here's the log:";
pub const INFORM_READY_START: &str = "Start watching. Will inform when it's ready.";
pub const GOODBYE: &str = "Bye.";
pub const WATCH_NOTE: &str = "( Enter <Ctrl + C> to halt )";
pub const WATCH_ENDING: &str = "Halted.";

/// Notification sent when a watched service reports ready.
pub fn service_ready(service: &str) -> String {
    format!("Service {} is Ready.", service)
}

/// Notification sent when a watch gives up.
pub fn service_watch_timeout(service: &str, secs: u64) -> String {
    format!(
        "Service {} did not become ready within {} seconds.",
        service, secs
    )
}

/// Approval prompt rendered before a gated capability runs.
pub fn ask_approval(capability: &str, input: &str) -> String {
    format!(
        "\nThe following action requires approval:\n\nInput:\n{}\n\nAction:\n{}\n\nDo you approve the above action? ",
        input, capability
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_prompt_mentions_input_and_action() {
        let prompt = ask_approval("delete_environments", r#"[{"id":"1","name":"dev"}]"#);
        assert!(prompt.contains("delete_environments"));
        assert!(prompt.contains(r#"[{"id":"1","name":"dev"}]"#));
        assert!(prompt.trim_end().ends_with('?'));
    }
}
