// models.rs - core data model: jobs, resources, context

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Renderer {
    Redshift,
    Arnold,
    Vray,
}

impl Renderer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Renderer::Redshift => "redshift",
            Renderer::Arnold => "arnold",
            Renderer::Vray => "vray",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderMethod {
    Auto,
    NativeBinary,
    HostScriptCustom,
    HostScriptBasic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuMode {
    Auto,
    Manual,
}

/// Per-instance lifecycle state. Transitions are enforced by the scheduler
/// loop only; no other component mutates `state` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Submitted,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

/// Classification of a scene path. Derived purely from the path string; used
/// only to choose a temp-directory layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Context {
    Shot {
        episode: String,
        sequence: String,
        shot: String,
        department: String,
    },
    Asset {
        category: String,
        subcategory: String,
        asset: String,
        department: String,
    },
    Unclassified,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gpu {
    pub device_id: u32,
    pub name: String,
    pub memory_total: u64,
    pub memory_free: u64,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub gpus: Vec<Gpu>,
    pub cpu_cores: u32,
    pub cpu_threads: u32,
    pub reserved_gpu_count: u32,
    pub reserved_cpu_threads: u32,
    pub mayapy_executable: Option<PathBuf>,
    pub render_executable: Option<PathBuf>,
}

impl ResourceSnapshot {
    pub fn available_gpus(&self) -> Vec<&Gpu> {
        self.gpus.iter().filter(|g| g.available).collect()
    }

    pub fn available_cpu_threads(&self) -> u32 {
        self.cpu_threads.saturating_sub(self.reserved_cpu_threads)
    }
}

/// A single attempt record, one per renderer command builder tried while
/// resolving `method = auto`. Preserves job identity across fallbacks (see
/// DESIGN.md, Open Question (c)).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub method: RenderMethod,
    pub exit_code: Option<i32>,
    pub error_kind: Option<ErrorKind>,
}

/// One unit of work: a render layer over a frame range, driven through one
/// renderer subprocess invocation (possibly several, via the fallback chain,
/// all recorded under the same `id`).
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub id: String,
    pub layer: String,
    pub frames: Vec<u32>,
    pub scene_path: PathBuf,
    pub temp_scene_path: Option<PathBuf>,
    pub gpu_mode: GpuMode,
    pub gpu_id: u32,
    pub use_gpu: bool,
    pub renderer: Renderer,
    pub method: RenderMethod,
    pub state: JobState,
    pub current_frame: u32,
    pub total_frames: u32,
    pub output_path: Option<PathBuf>,
    pub log_lines: VecDeque<String>,
    pub log_cap: usize,
    pub exit_code: Option<i32>,
    pub submit_time: SystemTime,
    pub start_time: Option<SystemTime>,
    pub end_time: Option<SystemTime>,
    pub error_kind: Option<ErrorKind>,
    pub fatal_observed: bool,
    pub attempts: Vec<Attempt>,
    pub context: Context,
}

impl RenderJob {
    pub fn push_log_line(&mut self, line: String) {
        if self.log_lines.len() >= self.log_cap {
            self.log_lines.pop_front();
        }
        self.log_lines.push_back(line);
    }

    pub fn progress_percent(&self) -> f64 {
        if self.total_frames == 0 {
            return 0.0;
        }
        let pct = 100.0 * self.current_frame as f64 / self.total_frames as f64;
        pct.clamp(0.0, 100.0)
    }

    pub fn frames_confirmed(&self) -> bool {
        self.current_frame >= self.total_frames
    }

    pub fn to_view(&self) -> JobView {
        JobView {
            id: self.id.clone(),
            layer: self.layer.clone(),
            frames_requested: self.frames.len() as u32,
            scene_path: self.scene_path.clone(),
            gpu_id: self.gpu_id,
            use_gpu: self.use_gpu,
            renderer: self.renderer,
            state: self.state,
            current_frame: self.current_frame,
            total_frames: self.total_frames,
            progress_percent: self.progress_percent(),
            output_path: self.output_path.clone(),
            exit_code: self.exit_code,
            error_kind: self.error_kind.clone(),
            frames_confirmed: self.frames_confirmed(),
            tail_log_lines: self.log_lines.iter().rev().take(20).rev().cloned().collect(),
        }
    }
}

/// Read-only, cloneable, serializable snapshot of a job. Returned by
/// `Facade::status`/`Facade::snapshot` without holding the job's lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub id: String,
    pub layer: String,
    pub frames_requested: u32,
    pub scene_path: PathBuf,
    pub gpu_id: u32,
    pub use_gpu: bool,
    pub renderer: Renderer,
    pub state: JobState,
    pub current_frame: u32,
    pub total_frames: u32,
    pub progress_percent: f64,
    pub output_path: Option<PathBuf>,
    pub exit_code: Option<i32>,
    pub error_kind: Option<ErrorKind>,
    pub frames_confirmed: bool,
    pub tail_log_lines: Vec<String>,
}

/// Submission request for a batch of render layers over the same scene.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub scene_path: PathBuf,
    pub layers: Vec<String>,
    pub frame_expr: String,
    pub renderer: Renderer,
    pub method: RenderMethod,
    pub gpu_mode: GpuMode,
    pub gpu_id: Option<u32>,
    pub use_gpu: bool,
}

/// Optional overrides applied when re-rendering a terminal job. Produces a
/// new job record (new `id`); this is not an in-place mutation.
#[derive(Debug, Clone, Default)]
pub struct RerenderOverrides {
    pub frame_expr: Option<String>,
    pub gpu_id: Option<u32>,
    pub use_gpu: Option<bool>,
}
