//! Artifact output
//!
//! Per-unit documentation artifacts and their deterministic naming.

pub mod materializer;

pub use materializer::{Materializer, WriteOutcome, artifact_relative_path};
