// main.rs - CLI demo binary driving the orchestrator against a stub
// renderer

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use batch_render_orchestrator::{
    Facade, GpuMode, RenderConfig, RenderMethod, Renderer, SchedulerConfig, StubSceneHost,
};

/// Drive a demo render batch through the orchestrator, using a stub scene
/// host and a shell-script stand-in renderer so the full admission/spawn/
/// log-parsing/cleanup path runs without a real renderer installed.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the scene file to render (need not exist when --demo is set;
    /// a scratch scene file is created instead)
    #[arg(long)]
    scene: Option<PathBuf>,

    /// Comma-separated render layer names
    #[arg(long, default_value = "BG_A")]
    layers: String,

    /// Frame range expression, e.g. "1-24" or "1-100x5,200"
    #[arg(long, default_value = "1-3")]
    frames: String,

    /// Renderer to use
    #[arg(long, default_value = "redshift")]
    renderer: String,

    /// Maximum number of concurrently running jobs
    #[arg(long, default_value_t = 2)]
    max_concurrent: usize,

    /// Also start the read-only HTTP observability API on this port
    #[arg(long)]
    http_port: Option<u16>,

    /// Run a self-contained demo: writes a scratch scene file and renders it
    /// with an `sh`-based stand-in renderer instead of a real one
    #[arg(long)]
    demo: bool,
}

fn parse_renderer(s: &str) -> Result<Renderer> {
    match s.to_lowercase().as_str() {
        "redshift" => Ok(Renderer::Redshift),
        "arnold" => Ok(Renderer::Arnold),
        "vray" => Ok(Renderer::Vray),
        other => anyhow::bail!("unknown renderer: {other}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    info!("starting batch-render-orchestrator with {args:?}");

    let scratch_dir = std::env::temp_dir().join("batch_render_orchestrator_demo");
    std::fs::create_dir_all(&scratch_dir).context("creating scratch directory")?;

    let scene_path = match args.scene {
        Some(p) => p,
        None => {
            let p = scratch_dir.join("demo_scene.ma");
            std::fs::write(&p, b"-- demo scene --").context("writing scratch scene")?;
            p
        }
    };

    let renderer = parse_renderer(&args.renderer)?;

    let facade = Arc::new(Facade::new(
        SchedulerConfig::default().with_max_concurrent_processes(args.max_concurrent),
        Arc::new(StubSceneHost),
        None,
        scratch_dir.join("fallback"),
    ));
    facade.initialize().await;

    if args.demo {
        // stand in for a renderer: both paths are normally resolved by the
        // resource probe, but here we point straight at `sh` so every
        // builder in the fallback chain can produce a spec and the
        // supervisor's spawn/stream/exit path runs end to end
        info!("demo mode: using /bin/sh as a stand-in renderer executable");
        let sh = PathBuf::from("/bin/sh");
        facade
            .override_executables(Some(sh.clone()), Some(sh))
            .await;
    }

    let mut events = facade.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!("event: {event:?}");
        }
    });

    if let Some(port) = args.http_port {
        let state = batch_render_orchestrator::api::http::ServerState::new(facade.clone());
        tokio::spawn(batch_render_orchestrator::api::http::start_server(state, port));
    }

    let config = RenderConfig {
        scene_path,
        layers: args.layers.split(',').map(|s| s.trim().to_string()).collect(),
        frame_expr: args.frames,
        renderer,
        method: RenderMethod::Auto,
        gpu_mode: GpuMode::Auto,
        gpu_id: None,
        use_gpu: false,
    };

    let job_ids = facade.start_batch(config).await?;
    info!("submitted jobs: {job_ids:?}");

    loop {
        tokio::time::sleep(Duration::from_millis(500)).await;
        let snapshot = facade.snapshot().await;
        let all_terminal = snapshot.iter().all(|j| j.state.is_terminal());
        for job in &snapshot {
            info!(
                "{}: {:?} {:.0}% ({}/{})",
                job.id, job.state, job.progress_percent, job.current_frame, job.total_frames
            );
        }
        if all_terminal {
            break;
        }
    }

    facade.shutdown().await;
    Ok(())
}
