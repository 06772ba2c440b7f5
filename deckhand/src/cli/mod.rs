//! Console input and output used by the interactive session.

pub mod console;
pub mod output;

pub use console::{Console, ReadOutcome, ReadlineConsole, ScriptedConsole};
pub use output::{OutputFormatter, ReasoningPrinter};
