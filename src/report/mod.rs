//! Report rendering.

pub mod generator;

pub use generator::{generate_agreement_markdown, generate_json, generate_progress_markdown};
