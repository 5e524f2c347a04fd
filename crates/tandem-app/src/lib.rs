//! tandem-app - Supervisor state machine and orchestration for tandem
//!
//! This crate owns the two supervised processes and their lifecycle: the
//! [`Supervisor`] control loop, the [`EventSink`] interface it reports
//! through, the [`CommandHandle`] a presentation layer drives it with,
//! configuration loading, and OS signal handling.

pub mod command;
pub mod config;
pub mod message;
pub mod signals;
pub mod sink;
pub mod supervisor;

// Re-export primary types
pub use command::{CommandHandle, SupervisorCommand};
pub use config::Settings;
pub use message::Message;
pub use sink::{ChannelSink, EventSink};
pub use supervisor::{SupervisedProcess, Supervisor, SupervisorConfig};
