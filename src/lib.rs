//! Over-the-air publisher for iOS builds
//!
//! Takes a freshly built `.ipa` and:
//! - reads its version metadata from the top-level `Info.plist`
//! - assigns the next build number for its `major.minor` line
//! - publishes the artifact, an install manifest and an index page exactly once
//! - bumps, commits, tags and pushes the project build number, but only if the
//!   branch still points at the commit the build was made from
//! - records the build number once the push went through
//!
//! It can be used both as a CLI tool and as a library dependency.

pub mod archive;
pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod fakes;
pub mod ledger;
pub mod metadata;
pub mod pipeline;
pub mod publish;
pub mod repository;
pub mod store;

// Re-export commonly used types
pub use error::{CliError, PipelineError, Result};
pub use pipeline::{Pipeline, PipelineOutcome, PipelineRequest};
