//! Events emitted while supervising runs

use serde::{Deserialize, Serialize};

use crate::log_entry::LogEntry;

/// Identifier of one run
pub type RunId = String;

/// Events emitted to subscribers of a [`RunSupervisor`](crate::RunSupervisor)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// A run started; the output list was cleared
    Started { run_id: RunId, source_id: String },
    /// A batch of entries was appended to the output list
    Output {
        run_id: RunId,
        entries: Vec<LogEntry>,
    },
    /// The run reached a terminal state and the supervisor is idle again
    Finished { run_id: RunId, outcome: RunOutcome },
}

impl RunEvent {
    pub fn run_id(&self) -> &str {
        match self {
            RunEvent::Started { run_id, .. }
            | RunEvent::Output { run_id, .. }
            | RunEvent::Finished { run_id, .. } => run_id,
        }
    }
}

/// How a run ended
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Process exited on its own
    Completed { exit_code: i32 },
    /// Compile, write or spawn failed; reported as one error entry
    Failed { message: String },
    /// Stopped explicitly or superseded by a newer run
    Killed,
}
