// lib.rs - library exports for batch-render-orchestrator
//
// The orchestrator admits render jobs into a FIFO queue, drives them across
// a bounded pool of GPU/CPU workers by spawning external renderer
// subprocesses, and surfaces their progress as an observable event stream.

pub mod api;
pub mod command_builder;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod facade;
pub mod frame_range;
pub mod log_parser;
pub mod models;
pub mod process;
pub mod resource_probe;
pub mod scene_host;
pub mod scheduler;
pub mod temp_files;

pub use config::SchedulerConfig;
pub use error::{ErrorKind, OrchestratorError, Result};
pub use events::FacadeEvent;
pub use facade::Facade;
pub use models::{
    Context, Gpu, GpuMode, JobState, JobView, RenderConfig, RenderJob, RenderMethod,
    RerenderOverrides, Renderer, ResourceSnapshot,
};
pub use scene_host::{SceneHost, StubSceneHost};
