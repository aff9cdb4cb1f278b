//! suiterun CLI
//!
//! Runs a generated test suite manifest locally through the same pipeline
//! the web front end uses, printing events as they arrive.

pub mod commands;
pub mod output;
