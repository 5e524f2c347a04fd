//! tandem Library
//!
//! Supervises a backend server and a browser engine. The supervisor itself
//! lives in `tandem-app`; this crate provides the headless presentation layer.

pub mod headless;

// Re-export main entry points
pub use headless::runner::run_headless;
pub use headless::{HeadlessEvent, NdjsonSink};
