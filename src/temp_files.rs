// temp_files.rs - per-job temp scene path derivation and retention cleanup

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Local};
use regex::Regex;

use crate::error::OrchestratorError;
use crate::models::Context;

fn version_pattern() -> Regex {
    Regex::new(r"(?i)_v(\d{3,4})").expect("static version pattern must compile")
}

/// Strip whitespace/newlines, replace filesystem-hostile characters, and
/// collapse spaces to underscores. Idempotent: `clean(clean(s)) == clean(s)`.
pub fn clean_filename(s: &str) -> String {
    let collapsed: String = s
        .chars()
        .map(|c| if c == '\n' || c == '\r' || c == '\t' { ' ' } else { c })
        .collect();
    let collapsed = collapsed.split_whitespace().collect::<Vec<_>>().join("_");

    collapsed
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            other => other,
        })
        .collect()
}

fn extract_version(scene_path: &Path) -> Option<String> {
    let stem = scene_path.to_string_lossy();
    version_pattern()
        .captures(&stem)
        .map(|c| format!("v{}", &c[1]))
}

/// Tracks temp files created for admitted jobs and applies retention
/// policies. Accessed only from the scheduler loop and the cleanup tasks it
/// posts, so the internal set uses a plain `Mutex` rather than an async one.
pub struct TempFileManager {
    project_root: Option<PathBuf>,
    fallback_root: PathBuf,
    created: Mutex<HashSet<PathBuf>>,
}

impl TempFileManager {
    pub fn new(project_root: Option<PathBuf>, fallback_root: PathBuf) -> Self {
        Self {
            project_root,
            fallback_root,
            created: Mutex::new(HashSet::new()),
        }
    }

    /// Derive the staged temp scene path for `(scene_path, layer, job_id)`
    /// given its resolved [`Context`]. Creates parent directories.
    pub fn generate_temp_filepath(
        &self,
        scene_path: &Path,
        layer: &str,
        job_id: &str,
        context: &Context,
        now: SystemTime,
    ) -> Result<PathBuf, OrchestratorError> {
        let clean_layer = clean_filename(layer);
        let version = extract_version(scene_path);
        let timestamp = format_timestamp(now);

        let (dir, prefix, dept) = match context {
            Context::Shot {
                episode,
                sequence,
                shot,
                department,
            } => {
                let root = self
                    .project_root
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("."));
                let dir = root
                    .join("scene")
                    .join(".tmp")
                    .join(clean_filename(episode))
                    .join(clean_filename(sequence))
                    .join(clean_filename(shot))
                    .join(clean_filename(department))
                    .join(&clean_layer);
                (dir, shot.clone(), department.clone())
            }
            Context::Asset {
                category,
                subcategory,
                asset,
                department,
            } => {
                let root = self
                    .project_root
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("."));
                let dir = root
                    .join("asset")
                    .join(".tmp")
                    .join(clean_filename(category))
                    .join(clean_filename(subcategory))
                    .join(clean_filename(asset))
                    .join(clean_filename(department))
                    .join(&clean_layer);
                (dir, asset.clone(), department.clone())
            }
            Context::Unclassified => {
                let dir = self.fallback_root.join(&clean_layer);
                let stem = scene_path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "scene".to_string());
                (dir, stem, String::new())
            }
        };

        std::fs::create_dir_all(&dir)
            .map_err(|e| OrchestratorError::TempFile(format!("mkdir -p {:?}: {e}", dir)))?;

        let mut components = vec![clean_filename(&prefix)];
        if !dept.is_empty() {
            components.push(clean_filename(&dept));
        }
        if let Some(v) = version {
            components.push(v);
        }
        components.push(timestamp);
        components.push(job_id.to_string());

        let filename = format!("render_{}.ma", components.join("_"));
        let path = dir.join(filename);

        self.created
            .lock()
            .expect("temp file registry poisoned")
            .insert(path.clone());

        Ok(path)
    }

    pub fn register_file(&self, path: PathBuf) {
        self.created
            .lock()
            .expect("temp file registry poisoned")
            .insert(path);
    }

    pub fn tracked_count(&self) -> usize {
        self.created.lock().expect("temp file registry poisoned").len()
    }

    /// Delete everything past the `keep_latest` most-recently-modified files
    /// under `dir`. Idempotent; individual delete failures are logged, not
    /// fatal.
    pub fn cleanup_keep_latest(&self, dir: &Path, keep_latest: usize) {
        let mut files = find_render_files(dir);
        files.sort_by_key(|(_, mtime)| std::cmp::Reverse(*mtime));

        for (path, _) in files.into_iter().skip(keep_latest) {
            if let Err(e) = std::fs::remove_file(&path) {
                log::warn!("failed to remove stale temp file {:?}: {e}", path);
            } else {
                self.created.lock().expect("temp file registry poisoned").remove(&path);
            }
        }
    }

    /// Delete files under `dir` older than `max_age`.
    pub fn cleanup_older_than(&self, dir: &Path, max_age: Duration, now: SystemTime) {
        for (path, mtime) in find_render_files(dir) {
            let age = now.duration_since(mtime).unwrap_or(Duration::ZERO);
            if age > max_age {
                if let Err(e) = std::fs::remove_file(&path) {
                    log::warn!("failed to remove aged-out temp file {:?}: {e}", path);
                } else {
                    self.created.lock().expect("temp file registry poisoned").remove(&path);
                }
            }
        }
    }
}

fn find_render_files(dir: &Path) -> Vec<(PathBuf, SystemTime)> {
    let mut out = Vec::new();
    visit(dir, &mut out);
    out
}

fn visit(dir: &Path, out: &mut Vec<(PathBuf, SystemTime)>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            visit(&path, out);
            continue;
        }
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name.starts_with("render_") && name.ends_with(".ma") {
            if let Ok(meta) = entry.metadata() {
                if let Ok(mtime) = meta.modified() {
                    out.push((path, mtime));
                }
            }
        }
    }
}

fn format_timestamp(t: SystemTime) -> String {
    let dt: DateTime<Local> = t.into();
    dt.format("%Y%m%d_%H%M%S").to_string()
}
