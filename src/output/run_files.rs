//! Per-run output files
//!
//! Every run writes its entities to a fresh timestamped file in the output
//! directory and repoints `<prefix>.latest` at it.

use chrono::{DateTime, Local};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File name of the output for a run started at `started`
pub fn output_file_name(prefix: &str, started: DateTime<Local>) -> String {
    format!("{}.{}.jsonl", prefix, started.format("%Y-%m-%dT%H-%M-%S"))
}

/// Path of the "latest" pointer for `prefix` inside `directory`
pub fn latest_link_path(directory: &Path, prefix: &str) -> PathBuf {
    directory.join(format!("{}.latest", prefix))
}

/// Prepares the output file for a new run
///
/// Creates the output directory, then replaces the `latest` pointer with one
/// referring to the new file by its relative name.
///
/// # Returns
///
/// The full path of the output file for this run
pub fn prepare_run_output(directory: &Path, prefix: &str, started: DateTime<Local>) -> io::Result<PathBuf> {
    fs::create_dir_all(directory)?;

    let file_name = output_file_name(prefix, started);
    let output_path = directory.join(&file_name);
    let latest = latest_link_path(directory, prefix);

    if latest.symlink_metadata().is_ok() {
        fs::remove_file(&latest)?;
    }
    point_latest(&file_name, &latest)?;

    tracing::info!(
        "Writing entities to {} ({} updated)",
        output_path.display(),
        latest.display()
    );
    Ok(output_path)
}

#[cfg(unix)]
fn point_latest(file_name: &str, latest: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(file_name, latest)
}

#[cfg(not(unix))]
fn point_latest(file_name: &str, latest: &Path) -> io::Result<()> {
    // No portable symlinks: store the target's name instead
    fs::write(latest, file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(hour: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2014, 4, 7, hour, 30, 0).unwrap()
    }

    #[test]
    fn test_output_file_name() {
        assert_eq!(output_file_name("repos", at(9)), "repos.2014-04-07T09-30-00.jsonl");
    }

    #[test]
    fn test_prepare_creates_directory_and_pointer() {
        let dir = TempDir::new().unwrap();
        let collection = dir.path().join("collection");

        let path = prepare_run_output(&collection, "issues", at(9)).unwrap();
        assert_eq!(path, collection.join("issues.2014-04-07T09-30-00.jsonl"));
        assert!(latest_link_path(&collection, "issues").symlink_metadata().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_latest_is_repointed() {
        let dir = TempDir::new().unwrap();
        prepare_run_output(dir.path(), "repos", at(9)).unwrap();
        prepare_run_output(dir.path(), "repos", at(10)).unwrap();

        let target = fs::read_link(latest_link_path(dir.path(), "repos")).unwrap();
        assert_eq!(target, PathBuf::from("repos.2014-04-07T10-30-00.jsonl"));
    }
}
