//! Local `node` as the execution container
//!
//! Files land in a work directory and programs run there with piped output.
//! Both pipes are read line by line into one channel, so a stdout line and a
//! stderr line can interleave but never split each other.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use tsplay_core::{Container, ContainerError, Process};

pub struct NodeContainer {
    workdir: PathBuf,
}

impl NodeContainer {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }
}

#[async_trait]
impl Container for NodeContainer {
    async fn write_file(&self, path: &str, contents: &str) -> Result<(), ContainerError> {
        let target = self.workdir.join(path);
        tokio::fs::write(&target, contents)
            .await
            .map_err(|e| ContainerError::Write {
                path: target.display().to_string(),
                message: e.to_string(),
            })
    }

    async fn spawn(
        &self,
        program: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<Box<dyn Process>, ContainerError> {
        let mut child = Command::new(program)
            .args(args)
            .envs(env)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ContainerError::Spawn {
                program: program.to_string(),
                message: e.to_string(),
            })?;
        debug!(program, pid = ?child.id(), "spawned");

        let (tx, output) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, tx));
        }

        Ok(Box::new(NodeProcess { child, output }))
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if tx.send(String::from_utf8_lossy(&buf).into_owned()).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(error = %e, "output pipe closed");
                break;
            }
        }
    }
}

struct NodeProcess {
    child: Child,
    output: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Process for NodeProcess {
    async fn next_chunk(&mut self) -> Option<String> {
        self.output.recv().await
    }

    async fn wait(&mut self) -> Result<i32, ContainerError> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| ContainerError::Wait(e.to_string()))?;
        // Killed by a signal: no code, report like a shell would
        Ok(status.code().unwrap_or(-1))
    }

    async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "failed to kill process");
        }
    }
}
