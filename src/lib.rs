//! devport Library
//!
//! Runs a local dev server for a project and opens it on simulators,
//! emulators and the desktop browser.

pub mod runner;

// Re-export main entry points
pub use runner::{run, RunOptions};
