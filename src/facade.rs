// facade.rs - the public API surface consumed by a host application
//
// Thin layer over the Scheduler: owns the scheduler-loop task and the
// periodic timeout ticker, and republishes the Scheduler's broadcast
// channel as-is.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::config::SchedulerConfig;
use crate::error::OrchestratorError;
use crate::events::FacadeEvent;
use crate::models::{JobView, RenderConfig, RerenderOverrides, ResourceSnapshot};
use crate::scene_host::SceneHost;
use crate::scheduler::Scheduler;

const TICK_INTERVAL: Duration = Duration::from_secs(5);

struct Tasks {
    loop_task: JoinHandle<()>,
    tick_task: JoinHandle<()>,
}

/// Owns the scheduler and its background tasks. `initialize` is idempotent:
/// calling it twice on an already-running facade is a no-op beyond
/// re-probing resources.
pub struct Facade {
    scheduler: Arc<Scheduler>,
    tasks: Mutex<Option<Tasks>>,
}

impl Facade {
    pub fn new(config: SchedulerConfig, scene_host: Arc<dyn SceneHost>, project_root: Option<PathBuf>, fallback_root: PathBuf) -> Self {
        let (scheduler, events_rx) = Scheduler::new(config, scene_host, project_root, fallback_root);

        let loop_scheduler = scheduler.clone();
        let loop_task = tokio::spawn(async move {
            loop_scheduler.run(events_rx).await;
        });

        let tick_scheduler = scheduler.clone();
        let tick_sender = scheduler.events_sender();
        let tick_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            loop {
                interval.tick().await;
                if tick_sender
                    .send(crate::events::SchedulerEvent::Tick)
                    .is_err()
                {
                    break;
                }
            }
            // keep a reference alive so the scheduler isn't dropped while ticking
            let _ = &tick_scheduler;
        });

        Self {
            scheduler,
            tasks: Mutex::new(Some(Tasks {
                loop_task,
                tick_task,
            })),
        }
    }

    /// Probe GPUs/CPU/executables once and publish the result. Idempotent:
    /// safe to call again to refresh the snapshot.
    pub async fn initialize(&self) {
        self.scheduler.initialize().await;
    }

    /// Override the renderer/host-script executable paths that command
    /// builders resolve against, bypassing the probed values. Intended for
    /// demo/test callers only; call after `initialize` to win the race.
    pub async fn override_executables(
        &self,
        renderer_exe_path: Option<PathBuf>,
        host_binary_path: Option<PathBuf>,
    ) {
        self.scheduler
            .override_executables(renderer_exe_path, host_binary_path)
            .await;
    }

    /// Submit every layer in `config` as its own job. Returns the job ids in
    /// submission order; `submit`-level validation (`NoRenderLayers`,
    /// `BadFrameExpression`) happens before any job is created.
    pub async fn start_batch(&self, config: RenderConfig) -> Result<Vec<String>, OrchestratorError> {
        self.scheduler.start_batch(config).await
    }

    /// Cancel a single job. Non-blocking: queued jobs are cancelled
    /// synchronously; running jobs only reach `Cancelled` once their
    /// subprocess exits or is force-killed.
    pub async fn cancel(&self, job_id: &str) {
        let _ = self
            .scheduler
            .events_sender()
            .send(crate::events::SchedulerEvent::Cancel {
                job_id: job_id.to_string(),
            });
    }

    /// Cancel every job that has not yet reached a terminal state.
    pub async fn stop_all(&self) {
        let _ = self
            .scheduler
            .events_sender()
            .send(crate::events::SchedulerEvent::CancelAll);
    }

    /// Re-submit a completed or failed job with optional overrides. Produces
    /// a new job id; the original terminal record is left untouched.
    pub async fn rerender(
        &self,
        job_id: &str,
        overrides: RerenderOverrides,
    ) -> Result<String, OrchestratorError> {
        self.scheduler.rerender(job_id, overrides).await
    }

    /// Adjust the concurrency ceiling. Raising it immediately tries to admit
    /// queued jobs; lowering it below the current running count never
    /// preempts already-running jobs.
    pub async fn set_max_concurrent(&self, n: usize) {
        let _ = self
            .scheduler
            .events_sender()
            .send(crate::events::SchedulerEvent::SetMaxConcurrent(n));
    }

    pub async fn status(&self, job_id: &str) -> Option<JobView> {
        self.scheduler.status(job_id).await
    }

    pub async fn snapshot(&self) -> Vec<JobView> {
        self.scheduler.snapshot().await
    }

    pub async fn resources(&self) -> ResourceSnapshot {
        self.scheduler.resources().await
    }

    /// Subscribe to the five observable event streams. Subscribers are
    /// invoked from the scheduler loop and must not block; a slow
    /// subscriber drops events rather than stalling the loop (see
    /// `tokio::sync::broadcast`'s lagging-receiver semantics).
    pub fn subscribe(&self) -> broadcast::Receiver<FacadeEvent> {
        self.scheduler.subscribe()
    }

    /// Abort the background loop and ticker. Intended for test teardown and
    /// graceful shutdown; in-flight subprocesses are not waited on.
    pub async fn shutdown(&self) {
        if let Some(tasks) = self.tasks.lock().await.take() {
            tasks.loop_task.abort();
            tasks.tick_task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GpuMode, RenderMethod, Renderer};
    use crate::scene_host::StubSceneHost;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn start_batch_rejects_empty_layers() {
        let dir = std::env::temp_dir().join(format!("facade_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let facade = Facade::new(
            SchedulerConfig::default(),
            Arc::new(StubSceneHost),
            None,
            dir.join("fallback"),
        );

        let config = RenderConfig {
            scene_path: dir.join("scene.ma"),
            layers: vec![],
            frame_expr: "1-3".to_string(),
            renderer: Renderer::Redshift,
            method: RenderMethod::NativeBinary,
            gpu_mode: GpuMode::Manual,
            gpu_id: Some(0),
            use_gpu: false,
        };

        assert!(facade.start_batch(config).await.is_err());
        facade.shutdown().await;
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn snapshot_reflects_submitted_jobs() {
        let dir = std::env::temp_dir().join(format!("facade_test2_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let scene = dir.join("scene.ma");
        std::fs::write(&scene, b"dummy").unwrap();

        let facade = Facade::new(
            SchedulerConfig::default().with_max_concurrent_processes(0),
            Arc::new(StubSceneHost),
            None,
            dir.join("fallback"),
        );

        let config = RenderConfig {
            scene_path: scene,
            layers: vec!["BG_A".to_string()],
            frame_expr: "1-3".to_string(),
            renderer: Renderer::Redshift,
            method: RenderMethod::NativeBinary,
            gpu_mode: GpuMode::Manual,
            gpu_id: Some(0),
            use_gpu: false,
        };
        let ids = facade.start_batch(config).await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(50)).await;

        let snapshot = facade.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, ids[0]);

        facade.shutdown().await;
        let _ = std::fs::remove_dir_all(dir);
    }
}
