// process.rs - renderer subprocess supervision
//
// Launches a child process with merged stdout/stderr, streams lines through
// a reader task into the scheduler's event channel, and enforces a
// graceful-terminate-then-kill escalation: SIGTERM, wait up to a grace
// period, then SIGKILL and wait again.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc::UnboundedSender, Mutex};

use crate::events::{ExitOutcome, SchedulerEvent};
use crate::log_parser::{self, LogEvent};
use crate::models::Renderer;

pub struct SpawnSpec {
    pub job_id: String,
    pub argv: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: PathBuf,
    pub renderer: Renderer,
}

struct Handle {
    child: Arc<Mutex<Child>>,
}

/// Tracks one live subprocess per job. All public methods are safe to call
/// concurrently; the internal map is the only shared mutable state.
#[derive(Default)]
pub struct ProcessSupervisor {
    handles: Mutex<HashMap<String, Handle>>,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `spec` and start a reader task that forwards classified log
    /// lines and the eventual exit outcome into `events`. The OS-level spawn
    /// itself is synchronous and its result is returned directly so the
    /// caller (the admission algorithm) can try the next fallback builder
    /// immediately without waiting on an event round-trip; only the
    /// process's eventual exit is reported asynchronously via `events`.
    pub async fn spawn(
        &self,
        spec: SpawnSpec,
        events: UnboundedSender<SchedulerEvent>,
    ) -> Result<(), String> {
        let mut command = Command::new(&spec.argv[0]);
        command
            .args(&spec.argv[1..])
            .current_dir(&spec.cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (k, v) in &spec.env {
            command.env(k, v);
        }

        let mut child = command.spawn().map_err(|e| e.to_string())?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let child = Arc::new(Mutex::new(child));
        self.handles.lock().await.insert(
            spec.job_id.clone(),
            Handle {
                child: child.clone(),
            },
        );

        let job_id = spec.job_id.clone();
        let renderer = spec.renderer;

        if let Some(stdout) = stdout {
            spawn_reader(job_id.clone(), renderer, stdout, events.clone());
        }
        if let Some(stderr) = stderr {
            spawn_reader(job_id.clone(), renderer, stderr, events.clone());
        }

        tokio::spawn(async move {
            let status = {
                let mut guard = child.lock().await;
                guard.wait().await
            };
            let outcome = match status {
                Ok(status) => ExitOutcome::Exited(status.code().unwrap_or(-1)),
                Err(e) => ExitOutcome::SpawnFailed(e.to_string()),
            };
            let _ = events.send(SchedulerEvent::Exit { job_id, outcome });
        });

        Ok(())
    }

    /// Request graceful termination, escalating to a hard kill after
    /// `grace_period` if the process is still alive, then giving up after
    /// `kill_grace_period` (logging, never panicking).
    pub async fn terminate(
        &self,
        job_id: &str,
        grace_period: Duration,
        kill_grace_period: Duration,
    ) {
        let child = {
            let handles = self.handles.lock().await;
            match handles.get(job_id) {
                Some(h) => h.child.clone(),
                None => return,
            }
        };

        let pid = { child.lock().await.id() };
        match pid {
            Some(pid) => {
                send_sigterm(pid);
                log::info!("job {job_id} sent SIGTERM (pid {pid}), waiting up to {grace_period:?}");
            }
            None => log::warn!("job {job_id} has no pid, already exited; waiting for reap"),
        }

        let graceful = tokio::time::timeout(grace_period, async {
            let mut guard = child.lock().await;
            guard.wait().await
        })
        .await;

        if graceful.is_ok() {
            return;
        }

        log::warn!("job {job_id} did not exit within grace period, sending kill");
        {
            let mut guard = child.lock().await;
            if let Err(e) = guard.start_kill() {
                log::warn!("failed to kill job {job_id}: {e}");
                return;
            }
        }

        let killed = tokio::time::timeout(kill_grace_period, async {
            let mut guard = child.lock().await;
            guard.wait().await
        })
        .await;

        if killed.is_err() {
            log::error!("job {job_id} did not exit even after kill, giving up");
        }
    }

    pub async fn forget(&self, job_id: &str) {
        self.handles.lock().await.remove(job_id);
    }
}

#[cfg(unix)]
fn send_sigterm(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) {}

fn spawn_reader<R>(
    job_id: String,
    renderer: Renderer,
    pipe: R,
    events: UnboundedSender<SchedulerEvent>,
) where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let event: LogEvent = log_parser::classify(renderer, &line);
                    if events
                        .send(SchedulerEvent::Log {
                            job_id: job_id.clone(),
                            event,
                        })
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("error reading output for job {job_id}: {e}");
                    break;
                }
            }
        }
    });
}

/// Build the `CUDA_VISIBLE_DEVICES` env entry for a job: set when
/// `use_gpu`, explicitly blank otherwise.
pub fn cuda_visible_devices(use_gpu: bool, gpu_id: u32) -> (String, String) {
    if use_gpu {
        ("CUDA_VISIBLE_DEVICES".to_string(), gpu_id.to_string())
    } else {
        ("CUDA_VISIBLE_DEVICES".to_string(), String::new())
    }
}
