//! Prompt composition
//!
//! - [`template`]: grounded/ungrounded templates and `{{placeholder}}` interpolation
//! - [`composer`]: budget enforcement and chunk dropping

pub mod composer;
pub mod template;

pub use composer::{Composer, Prompt};
pub use template::{PLACEHOLDERS, PromptTemplate, placeholders, render};
