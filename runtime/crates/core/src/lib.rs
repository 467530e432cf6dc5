//! tsplay core - run supervision for the TypeScript playground
//!
//! This crate turns an editor buffer into a supervised process and a stream
//! of structured console entries:
//!
//! - [`RunSupervisor`] - owns the single run slot (start, stop, supersede)
//! - [`StreamLineDemuxer`] - splits tagged process output into [`LogEntry`]s
//! - [`LogBatcher`] - coalesces entries into bounded, timed batches
//! - [`Container`] / [`Process`] - abstract the sandbox that executes code
//!
//! Source annotation, TypeScript lowering and the console shim live in
//! `tsx-engine`; this crate only wires them together.

pub mod batcher;
pub mod compiler;
pub mod config;
pub mod container;
pub mod debounce;
pub mod demux;
pub mod events;
pub mod log_entry;
pub mod supervisor;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

// Re-export commonly used items
pub use batcher::{LogBatcher, DEFAULT_FLUSH_INTERVAL, DEFAULT_HIGH_WATER_MARK};
pub use compiler::{Compiler, SwcCompiler};
pub use config::{AutoRunConfig, ConfigError, PlaygroundConfig, RunConfig, SupervisorConfig};
pub use container::{Container, ContainerError, Process};
pub use debounce::{Debouncer, DEFAULT_AUTO_RUN_DELAY};
pub use demux::StreamLineDemuxer;
pub use events::{RunEvent, RunId, RunOutcome};
pub use log_entry::{LogEntry, LogMethod};
pub use supervisor::{RunError, RunHandle, RunOptions, RunPhase, RunSupervisor, SourceDocument};
