//! # tandem-core - Core Domain Types
//!
//! Foundation crate for tandem. Provides domain types, error handling, event
//! definitions, the readiness detector and the output router.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, thiserror, regex, tracing).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`ProcessName`] - Which supervised process (Backend, Browser)
//! - [`ProcessState`] - Lifecycle state and its legal transitions
//! - [`StreamKind`], [`OutputKind`] - Stream origin and presentation kind
//!
//! ### Events (`events`)
//! - [`ProcessEvent`] - Raw line/exit events captured from one child instance
//! - [`OutputEvent`], [`LifecycleEvent`], [`SupervisorEvent`] - What the
//!   presentation layer receives
//!
//! ### Readiness (`readiness`)
//! - [`ReadinessDetector`] - Stateless line classifier
//! - [`ReadySignal`] - A URL found in output, or a bare marker
//!
//! ### Routing (`router`)
//! - [`route()`] - stdout/stderr line to output event
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use tandem_core::prelude::*;
//! ```

pub mod ansi;
pub mod error;
pub mod events;
pub mod logging;
pub mod readiness;
pub mod router;
pub mod types;

/// Prelude for common imports used throughout all tandem crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use ansi::{contains_ansi_codes, strip_ansi_codes};
pub use error::{Error, Result, ResultExt};
pub use events::{LifecycleEvent, OutputEvent, ProcessEvent, SupervisorEvent};
pub use readiness::{
    detect, ReadinessDetector, ReadySignal, DEFAULT_READY_MARKER, DEFAULT_READY_URL,
};
pub use router::route;
pub use types::{OutputKind, ProcessName, ProcessState, StreamKind};
