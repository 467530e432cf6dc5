//! tsx-engine
//!
//! Source-side half of the tsplay line-correlation pipeline:
//!
//! - [`annotate`] injects `[LINE_MARKER:<N>]` arguments into console calls
//! - [`transpile`] lowers TypeScript to JavaScript (SWC, types stripped)
//! - [`runtime_shim`] / [`compose_entry`] build the files handed to Node
//! - [`protocol`] defines the stdout tags both sides agree on
//!
//! Everything here is pure and synchronous.

pub mod annotate;
pub mod protocol;
pub mod shim;
mod transpiler;

pub use annotate::{annotate, annotate_with_report, Annotation, CONSOLE_METHODS};
pub use protocol::{line_marker, tagged_line, LogMethod};
pub use shim::{compose_entry, runtime_shim, SHIM_FILE_NAME};
pub use transpiler::{transpile, TranspileError};
