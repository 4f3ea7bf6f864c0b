//! Test-only generation harness.
//!
//! `MockGenerator` plays the adapter role with scripted responses keyed by
//! prompt, recording every call so tests can assert exactly what reached
//! the adapter (and, just as often, that nothing did).

use std::cell::RefCell;
use std::collections::HashMap;

use crate::executor::{GenerateError, Generator};

pub struct MockGenerator {
    /// Scripted outcome per prompt. Unscripted prompts echo
    /// `"<prompt> -> <input>"` so chains still produce distinct values.
    scripts: HashMap<String, Result<String, String>>,
    calls: RefCell<Vec<(String, String)>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Script a successful response for `prompt`.
    pub fn respond(mut self, prompt: &str, output: &str) -> Self {
        self.scripts
            .insert(prompt.to_string(), Ok(output.to_string()));
        self
    }

    /// Script a failure for `prompt`.
    pub fn fail(mut self, prompt: &str, error: &str) -> Self {
        self.scripts
            .insert(prompt.to_string(), Err(error.to_string()));
        self
    }

    /// Every (prompt, input) pair that reached the adapter, in order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator for MockGenerator {
    fn generate(&self, prompt: &str, input: &str) -> Result<String, GenerateError> {
        self.calls
            .borrow_mut()
            .push((prompt.to_string(), input.to_string()));
        match self.scripts.get(prompt) {
            Some(Ok(output)) => Ok(output.clone()),
            Some(Err(error)) => Err(GenerateError::new(error.clone())),
            None => Ok(format!("{} -> {}", prompt, input)),
        }
    }
}
