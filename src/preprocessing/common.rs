//! Common utilities module
//!
//! Error types and valid-cell statistics shared by every preprocessing step.

pub mod error;
pub mod stats;

pub use error::{ErrorKind, PipelineError, ProcessingError, Result};
