//! Analysis modules.
//!
//! Agreement coefficients, the Phase 2 agreement calculation and the
//! record aggregation behind the progress report and export.

pub mod aggregator;
pub mod agreement;
pub mod coefficients;

pub use aggregator::{export_bundle, progress_report};
pub use agreement::calculate_agreement;
