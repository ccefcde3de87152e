pub mod client;
pub mod core;
pub mod pipeline;
pub mod stages;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{
    ChangelogItem, CommitAuthor, ReleaseClient, ReleaseNotesMode, ReleaseRequest, Repo,
    new_client,
};
pub use crate::core::*;
pub use pipeline::{ErrorMemo, Pipeline, Publisher, Stage};
pub use stages::publishing_pipeline;
