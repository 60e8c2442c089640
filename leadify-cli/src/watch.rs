//! Assignment file-drop watch loop
//!
//! Polls an input directory for dropped `*.toml` assignment files, runs
//! each through the engine, writes the report to the output directory and
//! moves the assignment to `processed/` (or `failed/` with an error note).
//! This is the unattended overnight mode; Ctrl-C aborts the in-flight run
//! at the next safe boundary, leaving its checkpoint behind.

use crate::report::{self, ReportStyle};
use anyhow::Context;
use leadify_core::Assignment;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

/// Directory layout and cadence for the watch loop
pub struct WatchSettings {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub poll_interval: Duration,
    pub style: ReportStyle,
}

/// Result of processing one dropped assignment file
pub enum Processed {
    Report(PathBuf),
    Failed(String),
}

/// Find the next pending assignment file, oldest name first
pub fn next_assignment(input_dir: &Path) -> std::io::Result<Option<PathBuf>> {
    if !input_dir.exists() {
        std::fs::create_dir_all(input_dir)?;
        return Ok(None);
    }

    let mut candidates: Vec<PathBuf> = std::fs::read_dir(input_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file() && path.extension().is_some_and(|ext| ext == "toml")
        })
        .collect();

    candidates.sort();
    Ok(candidates.into_iter().next())
}

/// Move a handled assignment into `processed/` or `failed/`
pub fn archive_assignment(path: &Path, outcome: &Processed) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .context("assignment file has no parent directory")?;
    let subdir = match outcome {
        Processed::Report(_) => parent.join("processed"),
        Processed::Failed(_) => parent.join("failed"),
    };
    std::fs::create_dir_all(&subdir)?;

    let file_name = path.file_name().context("assignment file has no name")?;
    std::fs::rename(path, subdir.join(file_name))?;

    if let Processed::Failed(reason) = outcome {
        let note = subdir.join(format!(
            "{}.error.txt",
            Path::new(file_name).file_stem().unwrap_or_default().to_string_lossy()
        ));
        std::fs::write(note, reason)?;
    }

    Ok(())
}

/// Run the watch loop until Ctrl-C.
///
/// `process` runs one assignment to completion and returns the rendered
/// report path; it owns engine construction so the loop stays testable.
pub async fn watch_loop<F, Fut>(settings: WatchSettings, mut process: F) -> anyhow::Result<()>
where
    F: FnMut(Assignment, PathBuf) -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<PathBuf>>,
{
    info!(
        input = %settings.input_dir.display(),
        output = %settings.output_dir.display(),
        "Watching for assignments"
    );

    loop {
        let pending = next_assignment(&settings.input_dir)?;

        let path = match pending {
            Some(path) => path,
            None => {
                tokio::select! {
                    _ = tokio::time::sleep(settings.poll_interval) => {}
                    _ = tokio::signal::ctrl_c() => {
                        info!("Shutdown requested, stopping watch loop");
                        return Ok(());
                    }
                }
                continue;
            }
        };

        info!(assignment = %path.display(), "Processing assignment");

        let outcome = match Assignment::from_file(&path) {
            Ok(assignment) => {
                match process(assignment, settings.output_dir.clone()).await {
                    Ok(report_path) => {
                        info!(report = %report_path.display(), "Report written");
                        Processed::Report(report_path)
                    }
                    Err(e) => {
                        error!(error = %e, "Assignment processing failed");
                        Processed::Failed(format!("{:#}", e))
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Assignment file rejected");
                Processed::Failed(e.to_string())
            }
        };

        if let Err(e) = archive_assignment(&path, &outcome) {
            // Leaving the file in place would reprocess it forever; give up.
            error!(error = %e, "Failed to archive assignment, stopping watch loop");
            return Err(e);
        }
    }
}

/// Render and persist a finished run's report
pub fn deliver_report(
    snapshot: &leadify_engine::ReportSnapshot,
    output_dir: &Path,
    style: ReportStyle,
) -> anyhow::Result<PathBuf> {
    let content = report::render(snapshot, style);
    report::write_report(output_dir, &snapshot.objective, &content)
        .context("failed to write report")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_assignment_prefers_oldest_name_and_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b_second.toml"), "").unwrap();
        std::fs::write(dir.path().join("a_first.toml"), "").unwrap();
        std::fs::write(dir.path().join("notes.md"), "").unwrap();

        let next = next_assignment(dir.path()).unwrap().unwrap();
        assert_eq!(next.file_name().unwrap(), "a_first.toml");
    }

    #[test]
    fn next_assignment_creates_missing_input_dir() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("assignments");
        assert!(next_assignment(&input).unwrap().is_none());
        assert!(input.exists());
    }

    #[test]
    fn failed_assignments_move_with_error_note() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not an assignment").unwrap();

        archive_assignment(&path, &Processed::Failed("missing objective".to_string())).unwrap();

        assert!(!path.exists());
        assert!(dir.path().join("failed/bad.toml").exists());
        let note = std::fs::read_to_string(dir.path().join("failed/bad.error.txt")).unwrap();
        assert_eq!(note, "missing objective");
    }

    #[test]
    fn processed_assignments_move_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("good.toml");
        std::fs::write(&path, "").unwrap();

        archive_assignment(&path, &Processed::Report(PathBuf::from("r.md"))).unwrap();
        assert!(dir.path().join("processed/good.toml").exists());
        assert!(!dir.path().join("failed").exists());
    }
}
