//! Terminal rendering for the session loop.

use crate::agent::TurnObserver;
use crate::text;
use colored::Colorize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Prints session output with consistent prefixes and colors.
#[derive(Debug, Clone, Default)]
pub struct OutputFormatter {
    plain: bool,
}

impl OutputFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable colors, e.g. when stdout is not a terminal.
    pub fn without_color() -> Self {
        Self { plain: true }
    }

    pub fn welcome(&self) {
        if self.plain {
            println!("{}", text::WELCOME);
        } else {
            println!("{}", text::WELCOME.green().bold());
        }
    }

    pub fn response(&self, message: &str) {
        println!("{}", self.render_response(message));
    }

    pub fn reasoning(&self, reasoning: &str) {
        println!("{}", self.render_reasoning(reasoning));
    }

    pub fn inform(&self, message: &str) {
        if self.plain {
            println!("{}{}", text::INFORM_PREFIX, message);
        } else {
            println!("{}{}", text::INFORM_PREFIX.cyan().bold(), message);
        }
    }

    /// Fixed notices such as rejection or failure messages.
    pub fn notice(&self, message: &str) {
        if self.plain {
            println!("{}{}", text::RESPONSE_PREFIX, message);
        } else {
            println!("{}{}", text::RESPONSE_PREFIX.green().bold(), message.yellow());
        }
    }

    pub fn line(&self, message: &str) {
        println!("{}", message);
    }

    fn render_response(&self, message: &str) -> String {
        if self.plain {
            format!("{}{}", text::RESPONSE_PREFIX, message)
        } else {
            format!("{}{}", text::RESPONSE_PREFIX.green().bold(), message)
        }
    }

    fn render_reasoning(&self, reasoning: &str) -> String {
        if self.plain {
            format!("{}\n{}\n", text::REASONING_HEADER, reasoning)
        } else {
            format!(
                "{}\n{}\n",
                text::REASONING_HEADER.dimmed().bold(),
                reasoning.dimmed().italic()
            )
        }
    }
}

/// Prints each decision's reasoning while the shared flag is set.
pub struct ReasoningPrinter {
    show: Arc<AtomicBool>,
    output: OutputFormatter,
}

impl ReasoningPrinter {
    pub fn new(show: Arc<AtomicBool>, output: OutputFormatter) -> Self {
        Self { show, output }
    }
}

impl TurnObserver for ReasoningPrinter {
    fn on_reasoning(&self, reasoning: &str) {
        if self.show.load(Ordering::SeqCst) {
            self.output.reasoning(reasoning);
        }
    }
}
