//! Stage results threaded through the pipeline.

use crate::error::{PipelineError, Result};
use crate::ledger::ResolvedVersion;
use crate::publish::PublishReceipt;

/// Why the pipeline stopped early without failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    /// The manifest for this version is already in the store
    AlreadyPublished {
        /// Title the build would have been published under
        title: String,
        /// Existing manifest key
        manifest_key: String,
    },
    /// The branch moved after the build; the artifact is live but the
    /// repository and ledger were left alone
    GuardMismatch {
        /// Published version
        version: ResolvedVersion,
        /// What was published
        receipt: PublishReceipt,
        /// Commit the build was made from
        expected: String,
        /// Head found on the branch
        current: String,
    },
}

/// Result of one pipeline stage.
#[derive(Debug)]
pub enum Stage<T> {
    /// Carry on with the value
    Continue(T),
    /// Stop; not an error
    Halt(HaltReason),
    /// Stop with an error
    Fail(PipelineError),
}

impl<T> From<Result<T>> for Stage<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Continue(value),
            Err(error) => Self::Fail(error),
        }
    }
}

/// Unwrap a [`Stage::Continue`] or return the halt/failure from the
/// enclosing function.
///
/// Accepts anything convertible into a [`Stage`], so plain `Result`s can be
/// threaded the same way.
#[macro_export]
macro_rules! proceed {
    ($stage:expr) => {
        match $crate::pipeline::Stage::from($stage) {
            $crate::pipeline::Stage::Continue(value) => value,
            $crate::pipeline::Stage::Halt(reason) => {
                return $crate::pipeline::Stage::Halt(reason);
            }
            $crate::pipeline::Stage::Fail(error) => {
                return $crate::pipeline::Stage::Fail(error);
            }
        }
    };
}
