//! Environment bootstrap: make sure the two required CLI tools are present,
//! installing whichever are missing, before the application relies on them.
//!
//! ## Module structure
//! - `types` - State machine stages, log entries, failure details, events
//! - `log_buffer` - Bounded FIFO ring of log entries
//! - `sink` - Observer channels (`EventSink`)
//! - `classifier` - Heuristic suggestions from installer output
//! - `service` - `EnvBootstrapService`: single-flight run, transitions, failure handling
//! - `install` - Per-tool install step and output line splitting

mod classifier;
mod install;
mod log_buffer;
mod service;
mod sink;
mod types;

pub use classifier::{classify, spawn_suggestion_key, suggestion_key, FailureKind, HostOs};
pub use install::{tail_chars, LineSplitter, OUTPUT_TAIL_CHARS};
pub use log_buffer::{LogBuffer, MAX_LOG_ENTRIES};
pub use service::{EnvBootstrapService, ServiceBuilder};
pub use sink::{ChannelSink, EventSink, FnSink, NullSink};
pub use types::{
    BootstrapEvent, BootstrapState, FailureDetail, LogEntry, LogLevel, LogSource, Stage, Tool,
};
