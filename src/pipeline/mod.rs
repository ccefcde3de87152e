//! Sequential stage pipeline
//!
//! A [`Pipeline`] runs its [`Stage`]s one after another on a shared
//! [`Context`]. Each stage declares up front whether its failures are
//! continuable and when it should be skipped.

pub mod memo;
mod middleware;
pub mod runner;

pub use memo::ErrorMemo;
pub use runner::Pipeline;

use crate::core::context::Context;
use crate::core::error::PublishError;
use async_trait::async_trait;

/// One unit of publishing work
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Name shown in logs and error messages
    fn name(&self) -> &str;

    /// Do the work; return `PublishError::Skipped` when there is nothing to do
    async fn publish(&self, ctx: &mut Context) -> Result<(), PublishError>;
}

/// Predicate deciding whether a stage is skipped for a run
pub type SkipPredicate = Box<dyn Fn(&Context) -> bool + Send + Sync>;

/// A publisher together with its failure and skip policy
pub struct Stage {
    publisher: Box<dyn Publisher>,
    continue_on_error: bool,
    skip_if: Option<SkipPredicate>,
}

impl Stage {
    /// A fatal, never-skipped stage
    pub fn new(publisher: impl Publisher + 'static) -> Self {
        Self {
            publisher: Box::new(publisher),
            continue_on_error: false,
            skip_if: None,
        }
    }

    /// Record failures in the error memo instead of aborting the run
    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn skip_if(mut self, predicate: impl Fn(&Context) -> bool + Send + Sync + 'static) -> Self {
        self.skip_if = Some(Box::new(predicate));
        self
    }

    pub fn name(&self) -> &str {
        self.publisher.name()
    }

    pub fn is_continuable(&self) -> bool {
        self.continue_on_error
    }

    pub fn should_skip(&self, ctx: &Context) -> bool {
        self.skip_if.as_ref().is_some_and(|skip| skip(ctx))
    }

    pub(crate) fn publisher(&self) -> &dyn Publisher {
        self.publisher.as_ref()
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name())
            .field("continue_on_error", &self.continue_on_error)
            .field("skip_if", &self.skip_if.is_some())
            .finish()
    }
}
