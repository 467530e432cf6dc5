//! Run supervision.
//!
//! A [`RunSupervisor`] owns the single process slot of a playground: it
//! annotates and compiles the source, hands the result to the container,
//! wires the process output through a [`StreamLineDemuxer`] and a
//! [`LogBatcher`], and reports everything as [`RunEvent`]s.
//!
//! Lifecycle: `Idle -> Starting -> Running -> (Completed | Failed | Killed) -> Idle`.
//!
//! At most one run is live. `start` and `stop` cancel the active
//! [`RunHandle`] and bump the generation under the state lock before touching
//! anything else; every delivery re-checks the generation under the same
//! lock, so output from a superseded run is dropped even if the killed
//! process keeps writing for a while.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tsx_engine::{annotate, compose_entry, runtime_shim, TranspileError, SHIM_FILE_NAME};

use crate::batcher::LogBatcher;
use crate::compiler::{Compiler, SwcCompiler};
use crate::config::SupervisorConfig;
use crate::container::{Container, ContainerError, Process};
use crate::demux::StreamLineDemuxer;
use crate::events::{RunEvent, RunId, RunOutcome};
use crate::log_entry::LogEntry;

/// Source text of one editor tab/file. Borrowed per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Stable identifier of the originating tab/file
    pub id: String,
    pub text: String,
}

impl SourceDocument {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Per-run options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Annotate console calls and recover source lines from the output
    pub match_lines: bool,
    /// Passed through unmodified to the spawned process
    pub env: BTreeMap<String, String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            match_lines: true,
            env: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    /// Annotating, compiling, writing files, spawning
    Starting,
    /// Process spawned, output flowing
    Running,
}

/// Cancellation scope of one in-flight run.
#[derive(Debug, Clone)]
pub struct RunHandle {
    pub run_id: RunId,
    pub generation: u64,
    cancel: CancellationToken,
}

impl RunHandle {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Failures of the starting phase. Terminal for the run, never for the supervisor.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Compile(#[from] TranspileError),
    #[error(transparent)]
    Container(#[from] ContainerError),
}

#[derive(Debug)]
struct State {
    generation: u64,
    phase: RunPhase,
    active: Option<RunHandle>,
    output: Vec<LogEntry>,
    last_outcome: Option<RunOutcome>,
    subscribers: Vec<mpsc::UnboundedSender<RunEvent>>,
}

impl State {
    fn is_current(&self, generation: u64) -> bool {
        self.active
            .as_ref()
            .is_some_and(|h| h.generation == generation)
    }

    fn emit(&mut self, event: RunEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Cancel and discard the active run, reporting it as killed.
    fn kill_active(&mut self) -> bool {
        let Some(handle) = self.active.take() else {
            return false;
        };
        handle.cancel.cancel();
        self.generation += 1;
        self.phase = RunPhase::Idle;
        self.last_outcome = Some(RunOutcome::Killed);
        info!(run_id = %handle.run_id, "run killed");
        self.emit(RunEvent::Finished {
            run_id: handle.run_id,
            outcome: RunOutcome::Killed,
        });
        true
    }
}

struct Inner {
    container: Arc<dyn Container>,
    compiler: Arc<dyn Compiler>,
    config: SupervisorConfig,
    state: Mutex<State>,
}

/// Supervises at most one run at a time. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RunSupervisor {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RunSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("RunSupervisor")
            .field("phase", &state.phase)
            .field("generation", &state.generation)
            .field("output", &state.output.len())
            .finish()
    }
}

impl RunSupervisor {
    pub fn new(
        container: Arc<dyn Container>,
        compiler: Arc<dyn Compiler>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                container,
                compiler,
                config,
                state: Mutex::new(State {
                    generation: 0,
                    phase: RunPhase::Idle,
                    active: None,
                    output: Vec::new(),
                    last_outcome: None,
                    subscribers: Vec::new(),
                }),
            }),
        }
    }

    /// Supervisor using the SWC compiler from `tsx-engine`.
    pub fn with_swc(container: Arc<dyn Container>, config: SupervisorConfig) -> Self {
        Self::new(container, Arc::new(SwcCompiler), config)
    }

    /// Start a run of `doc`, killing any run still in flight first.
    ///
    /// Returns immediately; progress is reported through [`subscribe`](Self::subscribe).
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, doc: SourceDocument, options: RunOptions) -> RunId {
        let handle = {
            let mut state = self.inner.lock();
            state.kill_active();

            state.generation += 1;
            let handle = RunHandle {
                run_id: uuid::Uuid::new_v4().to_string(),
                generation: state.generation,
                cancel: CancellationToken::new(),
            };
            state.active = Some(handle.clone());
            state.phase = RunPhase::Starting;
            state.output.clear();
            state.last_outcome = None;

            info!(run_id = %handle.run_id, source_id = %doc.id, match_lines = options.match_lines, "run started");
            state.emit(RunEvent::Started {
                run_id: handle.run_id.clone(),
                source_id: doc.id.clone(),
            });
            handle
        };

        let run_id = handle.run_id.clone();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.execute(handle, doc, options).await });
        run_id
    }

    /// Kill the active run, if any. Output it produces from here on is dropped.
    pub fn stop(&self) {
        let mut state = self.inner.lock();
        if !state.kill_active() {
            debug!("stop: no active run");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().phase != RunPhase::Idle
    }

    pub fn phase(&self) -> RunPhase {
        self.inner.lock().phase
    }

    /// Entries delivered for the current (or last) run.
    pub fn output(&self) -> Vec<LogEntry> {
        self.inner.lock().output.clone()
    }

    pub fn clear_output(&self) {
        self.inner.lock().output.clear();
    }

    pub fn last_outcome(&self) -> Option<RunOutcome> {
        self.inner.lock().last_outcome.clone()
    }

    /// Handle of the run in flight.
    pub fn active_run(&self) -> Option<RunHandle> {
        self.inner.lock().active.clone()
    }

    /// Receive every event from now on, in the order state changed.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<RunEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().subscribers.push(tx);
        rx
    }
}

/// Outcome of one select step of the output loop.
enum Step {
    Cancelled,
    Chunk(Option<String>),
    Tick,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn execute(self: Arc<Self>, handle: RunHandle, doc: SourceDocument, options: RunOptions) {
        let outcome = match self.drive(&handle, doc, options).await {
            Ok(Some(exit_code)) => RunOutcome::Completed { exit_code },
            Ok(None) => {
                debug!(run_id = %handle.run_id, "run task exiting after cancellation");
                return;
            }
            Err(err) => {
                warn!(run_id = %handle.run_id, error = %err, "run failed");
                self.deliver(
                    handle.generation,
                    &handle.run_id,
                    vec![LogEntry::system_error(&err)],
                );
                RunOutcome::Failed {
                    message: err.to_string(),
                }
            }
        };
        self.finish(&handle, outcome);
    }

    /// Starting and running phases. `Ok(None)` when cancelled.
    async fn drive(
        self: &Arc<Self>,
        handle: &RunHandle,
        doc: SourceDocument,
        options: RunOptions,
    ) -> Result<Option<i32>, RunError> {
        let source = if options.match_lines {
            annotate(&doc.text)
        } else {
            doc.text
        };
        let compiled = self.compiler.compile(&source)?;
        let entry = compose_entry(&compiled);

        let shim = runtime_shim();
        let Some(written) =
            or_cancelled(&handle.cancel, self.container.write_file(SHIM_FILE_NAME, &shim)).await
        else {
            return Ok(None);
        };
        written?;

        let entry_file = self.config.entry_file.as_str();
        let Some(written) =
            or_cancelled(&handle.cancel, self.container.write_file(entry_file, &entry)).await
        else {
            return Ok(None);
        };
        written?;

        // Not raced: a process spawned after cancellation still has to be killed
        let args = vec![entry_file.to_string()];
        let mut process = self
            .container
            .spawn(&self.config.program, &args, &options.env)
            .await?;
        if handle.is_cancelled() {
            process.kill().await;
            return Ok(None);
        }
        self.set_phase(handle.generation, RunPhase::Running);

        self.pump(handle, process.as_mut(), options.match_lines).await
    }

    /// Feed process output through the demuxer and batcher until exit or cancellation.
    async fn pump(
        self: &Arc<Self>,
        handle: &RunHandle,
        process: &mut dyn Process,
        match_lines: bool,
    ) -> Result<Option<i32>, RunError> {
        let mut demux = StreamLineDemuxer::new(match_lines);
        let sink = {
            let inner = Arc::clone(self);
            let generation = handle.generation;
            let run_id = handle.run_id.clone();
            move |batch: Vec<LogEntry>| inner.deliver(generation, &run_id, batch)
        };
        let mut batcher = LogBatcher::new(self.config.high_water_mark, sink);

        let mut ticker = tokio::time::interval(self.config.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // Tick ahead of output so a busy stream cannot hold batches back
            let step = tokio::select! {
                biased;
                _ = handle.cancel.cancelled() => Step::Cancelled,
                _ = ticker.tick() => Step::Tick,
                chunk = process.next_chunk() => Step::Chunk(chunk),
            };

            match step {
                Step::Cancelled => {
                    process.kill().await;
                    return Ok(None);
                }
                Step::Chunk(Some(chunk)) => batcher.push(demux.feed(&chunk)),
                Step::Chunk(None) => break,
                Step::Tick => batcher.tick(),
            }
        }

        let waited = tokio::select! {
            biased;
            _ = handle.cancel.cancelled() => None,
            code = process.wait() => Some(code),
        };
        let Some(waited) = waited else {
            process.kill().await;
            return Ok(None);
        };

        // Output already read is delivered even if the exit status is lost
        batcher.push(demux.flush());
        batcher.drain_now();
        Ok(Some(waited?))
    }

    /// Append a batch to the output if `generation` is still the active run.
    fn deliver(&self, generation: u64, run_id: &str, entries: Vec<LogEntry>) {
        if entries.is_empty() {
            return;
        }
        let mut state = self.lock();
        if !state.is_current(generation) {
            debug!(run_id, discarded = entries.len(), "dropping output of superseded run");
            return;
        }
        state.output.extend(entries.iter().cloned());
        state.emit(RunEvent::Output {
            run_id: run_id.to_string(),
            entries,
        });
    }

    fn set_phase(&self, generation: u64, phase: RunPhase) {
        let mut state = self.lock();
        if state.is_current(generation) {
            debug!(?phase, "phase change");
            state.phase = phase;
        }
    }

    fn finish(&self, handle: &RunHandle, outcome: RunOutcome) {
        let mut state = self.lock();
        if !state.is_current(handle.generation) {
            return;
        }
        state.active = None;
        state.phase = RunPhase::Idle;
        state.last_outcome = Some(outcome.clone());
        info!(run_id = %handle.run_id, ?outcome, "run finished");
        state.emit(RunEvent::Finished {
            run_id: handle.run_id.clone(),
            outcome,
        });
    }
}

async fn or_cancelled<T>(cancel: &CancellationToken, fut: impl Future<Output = T>) -> Option<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        value = fut => Some(value),
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
