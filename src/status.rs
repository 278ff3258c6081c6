// src/status.rs
//
// =============================================================================
// MATENSEMBLE: WORKFLOW PATHS & STATUS FILE
// =============================================================================
//
// The on-disk layout every run produces, and the fixed-width status.log
// writer external watchers `watch -n 1 cat` against.

use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// 1. JOB IDENTITY
// ============================================================================

/// `SLURM_JOB_ID` when present, else `local-<pid>`.
pub fn job_id() -> String {
    std::env::var("SLURM_JOB_ID").unwrap_or_else(|_| format!("local-{}", std::process::id()))
}

pub fn timestamp_for_filename() -> String {
    Local::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}

// ============================================================================
// 2. ATOMIC TEXT WRITE
// ============================================================================

/// Writes `text` to `path` via write-temp-then-rename so a concurrent reader
/// (`watch cat status.log`) never observes a half-written file.
pub fn atomic_write_text(path: &Path, text: &str) -> Result<()> {
    let tmp = path.with_extension(match path.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_string(),
    });
    fs::write(&tmp, text).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("renaming {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

// ============================================================================
// 3. WORKFLOW PATHS
// ============================================================================

#[derive(Debug, Clone)]
pub struct WorkflowPaths {
    pub base_dir: PathBuf,
    pub status_file: PathBuf,
    pub logs_dir: PathBuf,
    pub out_dir: PathBuf,
    pub verbose_log_file: PathBuf,
}

impl WorkflowPaths {
    /// Builds and creates the directory tree:
    /// `<base_dir>/<job_id>_matensemble_workflow/{status.log, logs/, out/}`.
    pub fn create(base_dir: Option<&Path>) -> Result<Self> {
        let base_dir = match base_dir {
            Some(p) => p.to_path_buf(),
            None => std::env::current_dir().context("resolving current directory")?,
        };

        let workflow_dir = base_dir.join(format!("{}_matensemble_workflow", job_id()));
        let logs_dir = workflow_dir.join("logs");
        let out_dir = workflow_dir.join("out");
        let status_file = workflow_dir.join("status.log");

        fs::create_dir_all(&workflow_dir)
            .with_context(|| format!("creating {}", workflow_dir.display()))?;
        fs::create_dir_all(&logs_dir).with_context(|| format!("creating {}", logs_dir.display()))?;
        fs::create_dir_all(&out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

        let verbose_log_file =
            workflow_dir.join(format!("{}_matensemble_workflow.log", timestamp_for_filename()));

        Ok(Self {
            base_dir: workflow_dir,
            status_file,
            logs_dir,
            out_dir,
            verbose_log_file,
        })
    }
}

// ============================================================================
// 4. STATUS WRITER
// ============================================================================

pub struct StatusWriter {
    path: PathBuf,
}

impl StatusWriter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Renders the fixed-width status block. Column widths are load-bearing:
    /// external dashboards parse this with a fixed-offset scraper.
    pub fn render(pending: usize, running: usize, completed: usize, failed: usize, free_cores: usize, free_gpus: usize) -> String {
        let updated = Local::now().format("%Y-%m-%d %H:%M:%S");
        let mut out = String::new();
        out.push_str(&format!("UPDATED:   {}\n\n", updated));
        out.push_str("JOBS:        Pending     Running   Completed     Failed\n");
        out.push_str(&format!(
            "            {:>8}   {:>8}   {:>8}   {:>8}\n\n",
            pending, running, completed, failed
        ));
        out.push_str("RESOURCES:  Free Cores   Free GPUs\n");
        out.push_str(&format!("            {:>8}   {:>8}\n", free_cores, free_gpus));
        out
    }

    pub fn update(&self, pending: usize, running: usize, completed: usize, failed: usize, free_cores: usize, free_gpus: usize) -> Result<()> {
        let text = Self::render(pending, running, completed, failed, free_cores, free_gpus);
        atomic_write_text(&self.path, &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_has_fixed_columns() {
        let text = StatusWriter::render(3, 2, 10, 1, 16, 4);
        assert!(text.contains("JOBS:        Pending     Running   Completed     Failed"));
        assert!(text.contains("RESOURCES:  Free Cores   Free GPUs"));
    }

    #[test]
    fn atomic_write_survives_missing_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.log");
        atomic_write_text(&path, "hello").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");
    }
}
