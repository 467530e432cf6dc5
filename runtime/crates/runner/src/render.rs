//! Terminal output for run events.

use tsplay_core::{LogEntry, LogMethod, RunEvent, RunOutcome};

/// Where a rendered line should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// `[method] L<line> | content`, or `[method] content` without a line.
pub fn render_entry(entry: &LogEntry) -> String {
    match entry.line {
        Some(line) => format!("[{}] L{} | {}", entry.method, line, entry.content),
        None => format!("[{}] {}", entry.method, entry.content),
    }
}

pub fn stream_for(method: LogMethod) -> Stream {
    match method {
        LogMethod::Error | LogMethod::Warn => Stream::Stderr,
        LogMethod::Log | LogMethod::Info => Stream::Stdout,
    }
}

pub fn render_outcome(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Completed { exit_code: 0 } => "-- done".to_string(),
        RunOutcome::Completed { exit_code } => format!("-- exited with code {}", exit_code),
        RunOutcome::Failed { message } => format!("-- failed: {}", message),
        RunOutcome::Killed => "-- stopped".to_string(),
    }
}

/// Print one event, as a JSON line or as text.
pub fn print_event(event: &RunEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!(error = %e, "failed to encode event"),
        }
        return;
    }
    match event {
        RunEvent::Started { .. } => {}
        RunEvent::Output { entries, .. } => {
            for entry in entries {
                match stream_for(entry.method) {
                    Stream::Stdout => println!("{}", render_entry(entry)),
                    Stream::Stderr => eprintln!("{}", render_entry(entry)),
                }
            }
        }
        RunEvent::Finished { outcome, .. } => eprintln!("{}", render_outcome(outcome)),
    }
}

/// Process exit code for the CLI after a single run.
pub fn exit_code(outcome: &RunOutcome) -> i32 {
    match outcome {
        RunOutcome::Completed { exit_code } => *exit_code,
        RunOutcome::Failed { .. } => 1,
        RunOutcome::Killed => 130,
    }
}
