pub mod artifact;
pub mod config;
pub mod config_loader;
pub mod context;
pub mod error;
pub mod git;
pub mod retry;
pub mod template;

pub use artifact::*;
pub use context::*;
pub use error::*;
pub use retry::*;
pub use template::*;
