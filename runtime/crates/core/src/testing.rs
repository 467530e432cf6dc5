//! Scripted container for tests.
//!
//! [`FakeContainer`] records written files and spawn requests. Every spawned
//! [`FakeProcess`] is paired with a [`ProcessControl`] the test uses to push
//! output chunks and decide when (and with what code) the process exits.
//! Killing a fake process only flags it: its output channel stays open, like
//! a real process whose last writes are still in flight.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};

use crate::container::{Container, ContainerError, Process};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRecord {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct Failures {
    write: Option<String>,
    spawn: Option<String>,
}

pub struct FakeContainer {
    files: Mutex<BTreeMap<String, String>>,
    spawns: Mutex<Vec<SpawnRecord>>,
    failures: Mutex<Failures>,
    controls_tx: mpsc::UnboundedSender<ProcessControl>,
    controls_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ProcessControl>>,
}

impl FakeContainer {
    pub fn new() -> Arc<Self> {
        let (controls_tx, controls_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            files: Mutex::new(BTreeMap::new()),
            spawns: Mutex::new(Vec::new()),
            failures: Mutex::new(Failures::default()),
            controls_tx,
            controls_rx: tokio::sync::Mutex::new(controls_rx),
        })
    }

    /// Make the next `write_file` fail with `message`.
    pub fn fail_next_write(&self, message: &str) {
        self.failures().write = Some(message.to_string());
    }

    /// Make the next `spawn` fail with `message`.
    pub fn fail_next_spawn(&self, message: &str) {
        self.failures().spawn = Some(message.to_string());
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    pub fn spawns(&self) -> Vec<SpawnRecord> {
        self.spawns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Control handle of the next spawned process, in spawn order.
    pub async fn next_process(&self) -> Option<ProcessControl> {
        self.controls_rx.lock().await.recv().await
    }

    fn failures(&self) -> std::sync::MutexGuard<'_, Failures> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Container for FakeContainer {
    async fn write_file(&self, path: &str, contents: &str) -> Result<(), ContainerError> {
        if let Some(message) = self.failures().write.take() {
            return Err(ContainerError::Write {
                path: path.to_string(),
                message,
            });
        }
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), contents.to_string());
        Ok(())
    }

    async fn spawn(
        &self,
        program: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<Box<dyn Process>, ContainerError> {
        if let Some(message) = self.failures().spawn.take() {
            return Err(ContainerError::Spawn {
                program: program.to_string(),
                message,
            });
        }
        self.spawns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SpawnRecord {
                program: program.to_string(),
                args: args.to_vec(),
                env: env.clone(),
            });

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        let killed = Arc::new(AtomicBool::new(false));
        let queued = Arc::new(AtomicUsize::new(0));

        let _ = self.controls_tx.send(ProcessControl {
            output: output_tx,
            exit: exit_tx,
            killed: killed.clone(),
            queued: queued.clone(),
        });

        Ok(Box::new(FakeProcess {
            output: output_rx,
            exit: Some(exit_rx),
            killed,
            queued,
        }))
    }
}

/// Test-side end of a [`FakeProcess`].
#[derive(Debug)]
pub struct ProcessControl {
    output: mpsc::UnboundedSender<String>,
    exit: oneshot::Sender<i32>,
    killed: Arc<AtomicBool>,
    queued: Arc<AtomicUsize>,
}

impl ProcessControl {
    /// Push an output chunk. `false` once the supervisor dropped the process.
    pub fn emit(&self, chunk: &str) -> bool {
        let sent = self.output.send(chunk.to_string()).is_ok();
        if sent {
            self.queued.fetch_add(1, Ordering::SeqCst);
        }
        sent
    }

    /// Chunks emitted but not yet read by the supervisor.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Close the output streams and exit with `code`.
    pub fn exit(self, code: i32) {
        let ProcessControl { output, exit, .. } = self;
        drop(output);
        let _ = exit.send(code);
    }

    pub fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }
}

pub struct FakeProcess {
    output: mpsc::UnboundedReceiver<String>,
    exit: Option<oneshot::Receiver<i32>>,
    killed: Arc<AtomicBool>,
    queued: Arc<AtomicUsize>,
}

#[async_trait]
impl Process for FakeProcess {
    async fn next_chunk(&mut self) -> Option<String> {
        let chunk = self.output.recv().await;
        if chunk.is_some() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
        }
        chunk
    }

    async fn wait(&mut self) -> Result<i32, ContainerError> {
        let exit = self
            .exit
            .take()
            .ok_or_else(|| ContainerError::Wait("already waited".to_string()))?;
        exit.await
            .map_err(|_| ContainerError::Wait("process handle dropped".to_string()))
    }

    async fn kill(&mut self) {
        self.killed.store(true, Ordering::SeqCst);
    }
}
