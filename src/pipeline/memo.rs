//! Accumulator for continuable stage failures

use crate::core::error::PublishError;

/// Failures collected during one run, in stage order
#[derive(Debug, Default)]
pub struct ErrorMemo {
    errors: Vec<PublishError>,
}

impl ErrorMemo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a failure of `stage` and keep going
    pub fn memorize(&mut self, stage: &str, error: PublishError) {
        self.errors.push(PublishError::Continued {
            stage: stage.to_string(),
            source: Box::new(error),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[PublishError] {
        &self.errors
    }

    /// `Ok` when nothing was memorized, otherwise every failure joined
    pub fn into_result(self) -> Result<(), PublishError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(PublishError::Multiple(self.errors))
        }
    }
}
