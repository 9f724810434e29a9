//! Assignment planning for both annotation phases.

pub mod phase1;
pub mod phase2;

pub use phase1::{plan_phase1, Phase1Plan};
pub use phase2::plan_phase2;
