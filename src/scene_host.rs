// scene_host.rs - the host-application boundary
//
// Scene staging is inherently coupled to a specific host's scripting API
// (saving a scene with one render layer isolated). This models that
// coupling as a capability trait the scheduler consumes; concrete bindings
// (e.g. a Maya `cmds`-backed implementation) live outside this crate.

use std::path::Path;

use crate::error::OrchestratorError;

/// Produces, at `dest`, a scene file that renders `layer` correctly when
/// opened by the external renderer. The orchestrator treats this as a black
/// box: any failure becomes a job `FAILED(SceneStageError)`.
pub trait SceneHost: Send + Sync {
    fn write_scene(&self, source: &Path, layer: &str, dest: &Path) -> Result<(), OrchestratorError>;
}

/// Copies the source scene file verbatim to `dest`, creating parent
/// directories as needed. Used for tests and the CLI demo; it does not
/// actually isolate `layer` (a production binding would, e.g., toggle
/// render-layer visibility before saving).
pub struct StubSceneHost;

impl SceneHost for StubSceneHost {
    fn write_scene(&self, source: &Path, _layer: &str, dest: &Path) -> Result<(), OrchestratorError> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| OrchestratorError::SceneHost(format!("mkdir -p {:?}: {e}", parent)))?;
        }
        std::fs::copy(source, dest)
            .map_err(|e| OrchestratorError::SceneHost(format!("copy {:?} -> {:?}: {e}", source, dest)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_scene_host_copies_source_to_dest() {
        let dir = std::env::temp_dir().join(format!("scenehosttest_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let source = dir.join("source.ma");
        std::fs::write(&source, b"scene contents").unwrap();
        let dest = dir.join("nested").join("staged.ma");

        let host = StubSceneHost;
        host.write_scene(&source, "BG_A", &dest).unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"scene contents");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn stub_scene_host_errors_when_source_missing() {
        let dir = std::env::temp_dir().join(format!("scenehosttest2_{}", std::process::id()));
        let host = StubSceneHost;
        let result = host.write_scene(
            &dir.join("does-not-exist.ma"),
            "BG_A",
            &dir.join("out.ma"),
        );
        assert!(result.is_err());
    }
}
