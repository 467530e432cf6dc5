//! tsplay runner - native host for the playground pipeline
//!
//! Executes compiled playground code with a local `node` instead of a browser
//! container, and exposes the pipeline as the `tsplay` command.

pub mod cli;
pub mod node;
pub mod render;

pub use node::NodeContainer;
