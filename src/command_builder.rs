// command_builder.rs - (method, renderer) -> subprocess argv/env
//
// A registry of small pure builder functions keyed by (method, renderer),
// in place of a string-keyed if/elif renderer switch.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::frame_range::format as format_frames;
use crate::models::{Renderer, RenderMethod};
use crate::process::cuda_visible_devices;

/// Everything a builder needs to produce a command line. `renderer_exe_path`
/// is the renderer's own native binary; `host_binary_path` is the host
/// application's script-driven executable (e.g. `mayapy`/`Render`).
pub struct BuildContext<'a> {
    pub scene_path: &'a PathBuf,
    pub layer: &'a str,
    pub frames: &'a [u32],
    pub gpu_id: u32,
    pub use_gpu: bool,
    pub renderer: Renderer,
    pub renderer_exe_path: Option<&'a PathBuf>,
    pub host_binary_path: Option<&'a PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub argv: Vec<String>,
    pub env: Vec<(String, String)>,
}

type Builder = fn(&BuildContext) -> Option<CommandSpec>;

/// The ordered fallback chain tried under `method = auto`. The scheduler
/// owns the retry loop (§4.J): it reattempts the next builder within the
/// same job record on `SpawnError`, stopping on the first success or on
/// exhaustion.
pub fn auto_fallback_chain() -> Vec<RenderMethod> {
    vec![
        RenderMethod::HostScriptCustom,
        RenderMethod::NativeBinary,
        RenderMethod::HostScriptBasic,
    ]
}

/// Look up the builder for a concrete (non-`Auto`) method/renderer pair.
pub fn builder_for(method: RenderMethod, _renderer: Renderer) -> Option<Builder> {
    match method {
        RenderMethod::Auto => None,
        RenderMethod::NativeBinary => Some(build_native_binary),
        RenderMethod::HostScriptCustom => Some(build_host_script_custom),
        RenderMethod::HostScriptBasic => Some(build_host_script_basic),
    }
}

pub fn build(method: RenderMethod, renderer: Renderer, ctx: &BuildContext) -> Option<CommandSpec> {
    builder_for(method, renderer).and_then(|b| b(ctx))
}

fn base_env(ctx: &BuildContext) -> Vec<(String, String)> {
    vec![cuda_visible_devices(ctx.use_gpu, ctx.gpu_id)]
}

fn build_native_binary(ctx: &BuildContext) -> Option<CommandSpec> {
    let exe = ctx.renderer_exe_path?;
    let mut argv = vec![exe.to_string_lossy().to_string()];
    argv.push("-scene".to_string());
    argv.push(ctx.scene_path.to_string_lossy().to_string());
    argv.push("-layer".to_string());
    argv.push(ctx.layer.to_string());
    argv.push("-frames".to_string());
    argv.push(format_frames(ctx.frames));
    argv.push("-renderer".to_string());
    argv.push(ctx.renderer.as_str().to_string());
    Some(CommandSpec {
        argv,
        env: base_env(ctx),
    })
}

fn build_host_script_custom(ctx: &BuildContext) -> Option<CommandSpec> {
    let host = ctx.host_binary_path?;
    let argv = vec![
        host.to_string_lossy().to_string(),
        "-command".to_string(),
        format!(
            "batchRenderCustom(\"{}\", \"{}\", \"{}\", \"{}\")",
            ctx.scene_path.display(),
            ctx.layer,
            format_frames(ctx.frames),
            ctx.renderer.as_str(),
        ),
    ];
    Some(CommandSpec {
        argv,
        env: base_env(ctx),
    })
}

fn build_host_script_basic(ctx: &BuildContext) -> Option<CommandSpec> {
    let host = ctx.host_binary_path?;
    let argv = vec![
        host.to_string_lossy().to_string(),
        "-r".to_string(),
        ctx.renderer.as_str().to_string(),
        "-s".to_string(),
        format_frames(ctx.frames).split(',').next().unwrap_or("1").to_string(),
        ctx.scene_path.to_string_lossy().to_string(),
    ];
    Some(CommandSpec {
        argv,
        env: base_env(ctx),
    })
}

/// A registry indexed by `(method, renderer)`, present purely so the
/// scheduler can enumerate available builders without a match statement at
/// the call site — the actual dispatch above is a plain function lookup
/// since builders are renderer-agnostic save for the argv flags they emit.
pub fn registry() -> HashMap<(RenderMethod, Renderer), Builder> {
    let mut map = HashMap::new();
    for method in [
        RenderMethod::NativeBinary,
        RenderMethod::HostScriptCustom,
        RenderMethod::HostScriptBasic,
    ] {
        for renderer in [Renderer::Redshift, Renderer::Arnold, Renderer::Vray] {
            if let Some(b) = builder_for(method, renderer) {
                map.insert((method, renderer), b);
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_binary_requires_exe_path() {
        let scene = PathBuf::from("/scenes/a.ma");
        let ctx = BuildContext {
            scene_path: &scene,
            layer: "BG_A",
            frames: &[1, 2, 3],
            gpu_id: 0,
            use_gpu: true,
            renderer: Renderer::Redshift,
            renderer_exe_path: None,
            host_binary_path: None,
        };
        assert!(build(RenderMethod::NativeBinary, Renderer::Redshift, &ctx).is_none());
    }

    #[test]
    fn native_binary_sets_cuda_env_when_gpu_requested() {
        let scene = PathBuf::from("/scenes/a.ma");
        let exe = PathBuf::from("/opt/redshift/bin/redshiftCmdLine");
        let ctx = BuildContext {
            scene_path: &scene,
            layer: "BG_A",
            frames: &[1, 2, 3],
            gpu_id: 2,
            use_gpu: true,
            renderer: Renderer::Redshift,
            renderer_exe_path: Some(&exe),
            host_binary_path: None,
        };
        let spec = build(RenderMethod::NativeBinary, Renderer::Redshift, &ctx).unwrap();
        assert!(spec.env.contains(&("CUDA_VISIBLE_DEVICES".to_string(), "2".to_string())));
        assert!(spec.argv.contains(&"1-3".to_string()));
    }

    #[test]
    fn cuda_env_blank_when_cpu_mode() {
        let scene = PathBuf::from("/scenes/a.ma");
        let exe = PathBuf::from("/opt/redshift/bin/redshiftCmdLine");
        let ctx = BuildContext {
            scene_path: &scene,
            layer: "BG_A",
            frames: &[1],
            gpu_id: 0,
            use_gpu: false,
            renderer: Renderer::Redshift,
            renderer_exe_path: Some(&exe),
            host_binary_path: None,
        };
        let spec = build(RenderMethod::NativeBinary, Renderer::Redshift, &ctx).unwrap();
        assert!(spec.env.contains(&("CUDA_VISIBLE_DEVICES".to_string(), String::new())));
    }

    #[test]
    fn fallback_chain_order_matches_spec() {
        assert_eq!(
            auto_fallback_chain(),
            vec![
                RenderMethod::HostScriptCustom,
                RenderMethod::NativeBinary,
                RenderMethod::HostScriptBasic
            ]
        );
    }

    #[test]
    fn registry_covers_every_concrete_method_renderer_pair() {
        let reg = registry();
        assert_eq!(reg.len(), 3 * 3);
    }
}
