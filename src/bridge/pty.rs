use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{AgentResolver, BridgeError, BridgeEvent, TerminalBridge};
use crate::core::AgentType;

pub const DEFAULT_PTY_ROWS: u16 = 24;
pub const DEFAULT_PTY_COLS: u16 = 80;

/// Output is batched before it is pushed toward the store so a chatty
/// agent does not flood the event channel chunk-by-chunk.
const BATCH_SIZE: usize = 4096;
const BATCH_INTERVAL_MS: u64 = 16;

struct PtyProcess {
    writer: Box<dyn Write + Send>,
    reader_task: JoinHandle<()>,
    child: Box<dyn portable_pty::Child + Send + Sync>,
    master: Box<dyn portable_pty::MasterPty + Send>,
}

/// PTY-backed bridge implementation: one child process per session, raw
/// output forwarded as `BridgeEvent`s over the store's event channel.
pub struct PtyBridge {
    processes: Arc<Mutex<HashMap<Uuid, PtyProcess>>>,
    event_tx: mpsc::UnboundedSender<BridgeEvent>,
}

impl PtyBridge {
    pub fn new(event_tx: mpsc::UnboundedSender<BridgeEvent>) -> Self {
        Self {
            processes: Arc::new(Mutex::new(HashMap::new())),
            event_tx,
        }
    }

    #[cfg(unix)]
    async fn signal(&self, session_id: Uuid, signal: i32) -> Result<(), BridgeError> {
        let mut processes = self.processes.lock().await;
        let process = processes
            .get_mut(&session_id)
            .ok_or(BridgeError::NoProcess(session_id))?;
        let pid = process
            .child
            .process_id()
            .ok_or(BridgeError::Signal(session_id))?;

        let rc = unsafe { libc::kill(pid as i32, signal) };
        if rc == 0 {
            Ok(())
        } else {
            Err(BridgeError::Signal(session_id))
        }
    }
}

#[async_trait]
impl TerminalBridge for PtyBridge {
    async fn spawn(
        &self,
        session_id: Uuid,
        agent_type: AgentType,
        working_directory: PathBuf,
        override_executable: Option<String>,
    ) -> Result<i32, BridgeError> {
        let executable = AgentResolver::resolve(agent_type, override_executable.as_deref())
            .ok_or(BridgeError::ExecutableNotFound(agent_type.display_name()))?;

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: DEFAULT_PTY_ROWS,
                cols: DEFAULT_PTY_COLS,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| BridgeError::Pty(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&executable);
        cmd.cwd(&working_directory);
        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");
        cmd.env("LANG", "en_US.UTF-8");
        cmd.env("TERM_PROGRAM", "AgentsMonitor");
        for arg in agent_type.default_args() {
            cmd.arg(arg);
        }

        tracing::info!(
            "Spawning {} for session {} in {}",
            executable.display(),
            session_id,
            working_directory.display()
        );
        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| BridgeError::SpawnFailed(e.to_string()))?;
        let process_id = child.process_id().unwrap_or(0) as i32;

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| BridgeError::Pty(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| BridgeError::Pty(e.to_string()))?;

        // Blocking reader: batch raw chunks, then signal the end of the
        // stream so the store can mark the session ended.
        let event_tx = self.event_tx.clone();
        let reader_task = tokio::task::spawn_blocking(move || {
            let mut buffer = vec![0u8; BATCH_SIZE];
            let mut batch = Vec::with_capacity(BATCH_SIZE * 2);
            let mut last_emit = Instant::now();

            loop {
                match reader.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => {
                        batch.extend_from_slice(&buffer[..n]);
                        let elapsed = last_emit.elapsed().as_millis() as u64;
                        if batch.len() >= BATCH_SIZE || elapsed >= BATCH_INTERVAL_MS {
                            let bytes = std::mem::take(&mut batch);
                            let _ = event_tx.send(BridgeEvent::Output { session_id, bytes });
                            last_emit = Instant::now();
                        }
                    }
                    Err(e) => {
                        tracing::warn!("PTY read error for session {}: {}", session_id, e);
                        break;
                    }
                }
            }

            if !batch.is_empty() {
                let _ = event_tx.send(BridgeEvent::Output {
                    session_id,
                    bytes: batch,
                });
            }
            let _ = event_tx.send(BridgeEvent::Ended { session_id });
        });

        let process = PtyProcess {
            writer,
            reader_task,
            child,
            master: pair.master,
        };
        self.processes.lock().await.insert(session_id, process);

        Ok(process_id)
    }

    async fn write(&self, session_id: Uuid, data: &[u8]) -> Result<(), BridgeError> {
        let mut processes = self.processes.lock().await;
        let process = processes
            .get_mut(&session_id)
            .ok_or(BridgeError::NoProcess(session_id))?;

        process.writer.write_all(data)?;
        process.writer.flush()?;
        Ok(())
    }

    async fn resize(&self, session_id: Uuid, rows: u16, cols: u16) -> Result<(), BridgeError> {
        let processes = self.processes.lock().await;
        let process = processes
            .get(&session_id)
            .ok_or(BridgeError::NoProcess(session_id))?;

        process
            .master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| BridgeError::Pty(e.to_string()))
    }

    async fn suspend(&self, session_id: Uuid) -> Result<(), BridgeError> {
        #[cfg(unix)]
        {
            self.signal(session_id, libc::SIGSTOP).await
        }
        #[cfg(not(unix))]
        {
            Err(BridgeError::Signal(session_id))
        }
    }

    async fn resume(&self, session_id: Uuid) -> Result<(), BridgeError> {
        #[cfg(unix)]
        {
            self.signal(session_id, libc::SIGCONT).await
        }
        #[cfg(not(unix))]
        {
            Err(BridgeError::Signal(session_id))
        }
    }

    async fn terminate(&self, session_id: Uuid) -> Result<(), BridgeError> {
        let mut processes = self.processes.lock().await;
        if let Some(mut process) = processes.remove(&session_id) {
            drop(processes);

            // SIGTERM first, escalate to SIGKILL if the process lingers.
            #[cfg(unix)]
            if let Some(pid) = process.child.process_id() {
                unsafe {
                    libc::kill(pid as i32, libc::SIGTERM);
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;

            if process
                .child
                .try_wait()
                .map_err(|e| BridgeError::Pty(e.to_string()))?
                .is_none()
            {
                #[cfg(unix)]
                if let Some(pid) = process.child.process_id() {
                    unsafe {
                        libc::kill(pid as i32, libc::SIGKILL);
                    }
                }
                let _ = process.child.kill();
            }

            process.reader_task.abort();
        }

        Ok(())
    }
}
