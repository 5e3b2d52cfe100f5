// events.rs - internal scheduler events and external facade events

use crate::log_parser::LogEvent;
use crate::models::ResourceSnapshot;

/// Internal events consumed one at a time by the scheduler loop. Every
/// component that can affect job state posts into the same channel so that
/// all mutation is serialized through the loop.
#[derive(Debug)]
pub enum SchedulerEvent {
    Admission,
    Cancel { job_id: String },
    CancelAll,
    Log { job_id: String, event: LogEvent },
    Exit { job_id: String, outcome: ExitOutcome },
    Tick,
    SetMaxConcurrent(usize),
}

#[derive(Debug)]
pub enum ExitOutcome {
    Exited(i32),
    SpawnFailed(String),
}

/// Externally observable events, republished by the Facade over a broadcast
/// channel.
#[derive(Debug, Clone)]
pub enum FacadeEvent {
    RenderStarted { job_id: String },
    RenderProgress { job_id: String, percent: f64 },
    RenderLog { job_id: String, line: String },
    RenderCompleted { job_id: String, success: bool },
    SystemInfoUpdated { snapshot: ResourceSnapshot },
}
