use std::sync::Arc;

use tracing::info;

use crate::traits::{Output, ProgressEvent};

/// Emits the timestamped progress stream of an operation
///
/// Events are always logged; in quiet mode they are not printed.
#[derive(Clone)]
pub struct ProgressReporter {
    output: Arc<dyn Output>,
    quiet: bool,
}

impl ProgressReporter {
    pub fn new(output: Arc<dyn Output>, quiet: bool) -> Self {
        Self { output, quiet }
    }

    pub fn report(&self, message: impl Into<String>) {
        let event = ProgressEvent::now(message);
        info!(target: "dcmigrate::progress", "{}", event.message);
        if !self.quiet {
            self.output.progress(&event);
        }
    }

    /// Announce stage `number` of `total`
    pub fn stage(&self, number: usize, total: usize, description: &str) {
        info!(target: "dcmigrate::progress", stage = number, total, "{}", description);
        if !self.quiet {
            self.output.step(number, total, description);
        }
    }
}
