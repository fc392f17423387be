//! Core types shared across the crate.
//!
//! The error module defines the two failure domains the pipeline cares
//! about: download failures (with their retry classification) and
//! module-file parse failures.

pub mod error;

pub use error::{DownloadError, ParseError};
