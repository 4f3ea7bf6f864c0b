// PromptGrid CLI - pipeline operations, headless and interactive

pub mod doctor;
pub mod exit_codes;
pub mod pipeline;
pub mod run;
pub mod tui;
mod util;

use exit_codes::{EXIT_IO, EXIT_PIPELINE_PARSE, EXIT_USAGE};

/// Error carried out of every command: an exit code from the registry, a
/// message, and an optional actionable hint.
#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self {
            code: EXIT_USAGE,
            message: msg.into(),
            hint: None,
        }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self {
            code: EXIT_IO,
            message: msg.into(),
            hint: None,
        }
    }

    pub fn pipeline(msg: impl Into<String>) -> Self {
        Self {
            code: EXIT_PIPELINE_PARSE,
            message: msg.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
