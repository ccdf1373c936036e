//! Code Analyzer Module
//!
//! - File scanning with gitignore support
//! - Structural C++ unit extraction

pub mod extractor;
pub mod scanner;

pub use extractor::{ExtractionError, Extraction, UnitExtractor, UnitStream, extract_units};
pub use scanner::{FileScanner, ScanResult, ScannedFile, SkippedFile};
