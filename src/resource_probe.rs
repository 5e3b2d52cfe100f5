// resource_probe.rs - GPU/CPU/executable discovery
//
// Shells out to `nvidia-smi` for GPU inventory (CSV parsing, MiB to bytes),
// `num_cpus` for core counts, and a PATH/known-location search for the host
// executable. Never propagates a hard error: detection failures degrade to
// an empty GPU list and a diagnostic log line, so callers can always fall
// back to CPU rendering.

use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::models::{Gpu, ResourceSnapshot};

const MAYA_VERSIONS: &[&str] = &["2025", "2024", "2023", "2022"];

pub struct ResourceProbe {
    pub reserved_gpu_count: u32,
    pub reserved_cpu_threads: u32,
}

impl ResourceProbe {
    pub fn new(reserved_gpu_count: u32, reserved_cpu_threads: u32) -> Self {
        Self {
            reserved_gpu_count,
            reserved_cpu_threads,
        }
    }

    /// Probe the host once. Never fails; detection problems degrade to an
    /// empty GPU list.
    pub async fn snapshot(&self) -> ResourceSnapshot {
        let mut gpus = detect_nvidia_smi().await.unwrap_or_else(|e| {
            log::warn!("GPU detection failed, degrading to CPU-only: {e}");
            Vec::new()
        });

        for (idx, gpu) in gpus.iter_mut().enumerate() {
            gpu.available = (idx as u32) >= self.reserved_gpu_count;
        }

        let cpu_threads = num_cpus::get() as u32;
        let cpu_cores = num_cpus::get_physical() as u32;
        let cpu_cores = if cpu_cores == 0 {
            (cpu_threads / 2).max(1)
        } else {
            cpu_cores
        };

        ResourceSnapshot {
            reserved_gpu_count: self.reserved_gpu_count,
            reserved_cpu_threads: self.reserved_cpu_threads,
            gpus,
            cpu_cores,
            cpu_threads,
            mayapy_executable: find_executable("mayapy"),
            render_executable: find_executable("Render"),
        }
    }
}

async fn detect_nvidia_smi() -> Result<Vec<Gpu>, String> {
    let output = Command::new("nvidia-smi")
        .args([
            "--query-gpu=index,name,memory.total,memory.free",
            "--format=csv,noheader,nounits",
        ])
        .output()
        .await
        .map_err(|e| e.to_string())?;

    if !output.status.success() {
        return Err(format!("nvidia-smi exited with {:?}", output.status.code()));
    }

    let text = String::from_utf8_lossy(&output.stdout);
    let mut gpus = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(|s| s.trim()).collect();
        if fields.len() < 4 {
            continue;
        }
        let device_id: u32 = fields[0].parse().map_err(|_| "bad index field".to_string())?;
        let name = fields[1].to_string();
        let mem_total_mib: u64 = fields[2].parse().map_err(|_| "bad memory.total field".to_string())?;
        let mem_free_mib: u64 = fields[3].parse().map_err(|_| "bad memory.free field".to_string())?;
        gpus.push(Gpu {
            device_id,
            name,
            memory_total: mem_total_mib * 1024 * 1024,
            memory_free: mem_free_mib * 1024 * 1024,
            available: true,
        });
    }
    Ok(gpus)
}

/// Walk a version-ordered list of candidate installation paths, returning
/// the first one that exists. Platform-specific path templates; fails slow
/// (returns `None` rather than erroring).
fn find_executable(name: &str) -> Option<PathBuf> {
    for version in MAYA_VERSIONS {
        for candidate in candidate_paths(name, version) {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }
    None
}

#[cfg(target_os = "windows")]
fn candidate_paths(name: &str, version: &str) -> Vec<PathBuf> {
    vec![PathBuf::from(format!(
        r"C:\Program Files\Autodesk\Maya{version}\bin\{name}.exe"
    ))]
}

#[cfg(not(target_os = "windows"))]
fn candidate_paths(name: &str, version: &str) -> Vec<PathBuf> {
    vec![
        PathBuf::from(format!("/usr/autodesk/maya{version}/bin/{name}")),
        PathBuf::from(format!("/opt/autodesk/maya{version}/bin/{name}")),
    ]
}

pub fn format_memory_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

pub fn is_path_present(path: &Path) -> bool {
    path.exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_memory_size_human_readable() {
        assert_eq!(format_memory_size(1024), "1.00 KB");
        assert_eq!(format_memory_size(1024 * 1024 * 8), "8.00 MB");
    }

    #[test]
    fn executable_discovery_returns_none_when_absent() {
        assert!(find_executable("definitely-not-a-real-binary-xyz").is_none());
    }

    #[tokio::test]
    async fn snapshot_never_panics_when_nvidia_smi_is_absent() {
        let probe = ResourceProbe::new(1, 4);
        let snapshot = probe.snapshot().await;
        assert!(snapshot.cpu_threads >= 1);
    }
}
