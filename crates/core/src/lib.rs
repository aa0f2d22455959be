//! Shared error and result types for the dispatch control plane.
//!
//! Every crate in the workspace builds its own typed errors on top of
//! [`Error`] rather than reaching for `anyhow` below the binary boundary.

#![forbid(unsafe_code)]

mod error;

pub use error::{Error, Result};
