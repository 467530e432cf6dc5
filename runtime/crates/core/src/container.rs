//! Execution collaborator traits.
//!
//! Abstracts the sandbox a run executes in so the supervisor works the same
//! against a local Node installation, a browser container, or a scripted fake
//! in tests:
//!
//! - [`Container`] - filesystem writes and process spawning
//! - [`Process`] - one spawned process: its combined output, exit and kill

use async_trait::async_trait;
use std::collections::BTreeMap;

/// Error type for container operations
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("failed to write {path}: {message}")]
    Write { path: String, message: String },

    #[error("failed to spawn `{program}`: {message}")]
    Spawn { program: String, message: String },

    #[error("failed waiting for process exit: {0}")]
    Wait(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Sandbox that can hold files and run processes.
#[async_trait]
pub trait Container: Send + Sync {
    /// Write `contents` to `path`, relative to the container's working directory.
    async fn write_file(&self, path: &str, contents: &str) -> Result<(), ContainerError>;

    /// Start `program` with `args`. `env` is passed through unmodified.
    async fn spawn(
        &self,
        program: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<Box<dyn Process>, ContainerError>;
}

/// A running process.
#[async_trait]
pub trait Process: Send {
    /// Next fragment of combined stdout/stderr, `None` once both streams
    /// closed. Must be cancel-safe: dropping the future loses no output.
    async fn next_chunk(&mut self) -> Option<String>;

    /// Wait for the process to exit and return its exit code.
    async fn wait(&mut self) -> Result<i32, ContainerError>;

    /// Best-effort termination. Output already in flight may still arrive.
    async fn kill(&mut self);
}
