//! # newln Common Library
//!
//! Shared code for the newln services:
//! - Error type and result alias
//! - Job status and artifact kind enums
//! - Progress event wire format
//! - Configuration file model and path resolution

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{ArtifactKind, JobStatus, ProgressEvent};
