//! Interactive annotation sessions.

pub mod console;
pub mod state;

pub use state::Session;
