//! suiterun Common Library
//!
//! Wire types shared by the execution engine and its front ends: the
//! request manifest, the streamed events and the canonical test report.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;

/// suiterun version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
