//! Safety utilities to prevent accidental loss of an existing output file.
//!
//! Rows are written to a temporary file next to the output. The output path
//! is only touched once the run produced at least one row, and an existing
//! file is either refused, backed up or replaced depending on the `-f` count.

use anyhow::{bail, Context, Result};
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

/// `-f` given once: keep the old output as a backup.
pub const OVERWRITE_WITH_BACKUP: u8 = 1;
/// `-ff`: replace the old output.
pub const OVERWRITE_REPLACE: u8 = 2;

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Validates that an output path is safe to write.
///
/// Checks:
/// - Output cannot be the same file as the input
/// - An existing output requires `overwrite > 0`
/// - Output cannot be a directory
pub fn validate_output_path(output: &Path, input: Option<&Path>, overwrite: u8) -> Result<()> {
    if let Some(input) = input {
        if same_file(output, input) {
            bail!(
                "Safety check failed: output '{}' cannot be the same as input '{}'",
                output.display(),
                input.display()
            );
        }
    }

    if output.is_dir() {
        bail!("Safety check failed: output '{}' is a directory", output.display());
    }

    if output.exists() && overwrite == 0 {
        bail!(
            "Safety check failed: output '{}' already exists (use -f to keep a backup, -ff to replace it)",
            output.display()
        );
    }

    Ok(())
}

/// First free backup name: `<output>.bak`, then `<output>.bak.1`, `<output>.bak.2`, ...
pub fn backup_path(output: &Path) -> PathBuf {
    let with_suffix = |suffix: &str| {
        let mut name = OsString::from(output.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    };

    let first = with_suffix(".bak");
    if !first.exists() {
        return first;
    }
    (1u32..)
        .map(|n| with_suffix(&format!(".bak.{}", n)))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

/// What [`PendingOutput::finish`] did with the output path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishOutcome {
    /// No rows were written; the output path was not touched.
    Untouched,
    Written,
    /// The previous output was moved to the contained path.
    WrittenWithBackup(PathBuf),
}

/// Output rows staged in a temporary file until [`finish`](Self::finish).
///
/// Dropping it without finishing removes the temporary file.
pub struct PendingOutput {
    temp: NamedTempFile,
    output: PathBuf,
    overwrite: u8,
}

impl PendingOutput {
    /// Create the temporary file in the output's directory.
    pub fn create(output: &Path, overwrite: u8) -> Result<Self> {
        let dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let temp = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
        Ok(Self {
            temp,
            output: output.to_path_buf(),
            overwrite,
        })
    }

    /// Move the staged rows to the output path.
    pub fn finish(self, rows_written: u64) -> Result<FinishOutcome> {
        if rows_written == 0 {
            info!(output = %self.output.display(), "no rows written, output left untouched");
            return Ok(FinishOutcome::Untouched);
        }

        let mut outcome = FinishOutcome::Written;
        if self.output.exists() && self.overwrite < OVERWRITE_REPLACE {
            if self.overwrite < OVERWRITE_WITH_BACKUP {
                bail!(
                    "Safety check failed: output '{}' appeared during the run",
                    self.output.display()
                );
            }
            let backup = backup_path(&self.output);
            fs::rename(&self.output, &backup).with_context(|| {
                format!(
                    "Failed to back up {} to {}",
                    self.output.display(),
                    backup.display()
                )
            })?;
            info!(backup = %backup.display(), "previous output backed up");
            outcome = FinishOutcome::WrittenWithBackup(backup);
        }

        self.temp
            .persist(&self.output)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to write {}", self.output.display()))?;
        Ok(outcome)
    }
}

impl Write for PendingOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_new_output_is_valid() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("movies.csv");
        let input = dir.path().join("files.csv");
        assert!(validate_output_path(&output, Some(&input), 0).is_ok());
        assert!(validate_output_path(&output, None, 0).is_ok());
    }

    #[test]
    fn test_output_equals_input() {
        let path = PathBuf::from("/data/movies.csv");
        let result = validate_output_path(&path, Some(&path), 2);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("cannot be the same as input"));
    }

    #[test]
    fn test_existing_output_requires_force() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("movies.csv");
        fs::write(&output, "old").unwrap();
        let result = validate_output_path(&output, None, 0);
        assert!(result.unwrap_err().to_string().contains("already exists"));
        assert!(validate_output_path(&output, None, 1).is_ok());
    }

    #[test]
    fn test_backup_path_numbering() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("movies.csv");
        assert_eq!(backup_path(&output), dir.path().join("movies.csv.bak"));
        fs::write(dir.path().join("movies.csv.bak"), "").unwrap();
        assert_eq!(backup_path(&output), dir.path().join("movies.csv.bak.1"));
        fs::write(dir.path().join("movies.csv.bak.1"), "").unwrap();
        assert_eq!(backup_path(&output), dir.path().join("movies.csv.bak.2"));
    }

    #[test]
    fn test_finish_without_rows_leaves_output() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("movies.csv");
        fs::write(&output, "old").unwrap();
        let mut pending = PendingOutput::create(&output, 2).unwrap();
        pending.write_all(b"new").unwrap();
        assert_eq!(pending.finish(0).unwrap(), FinishOutcome::Untouched);
        assert_eq!(fs::read_to_string(&output).unwrap(), "old");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_finish_with_backup() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("movies.csv");
        fs::write(&output, "old").unwrap();
        let mut pending = PendingOutput::create(&output, 1).unwrap();
        pending.write_all(b"new").unwrap();
        let backup = dir.path().join("movies.csv.bak");
        assert_eq!(
            pending.finish(1).unwrap(),
            FinishOutcome::WrittenWithBackup(backup.clone())
        );
        assert_eq!(fs::read_to_string(&output).unwrap(), "new");
        assert_eq!(fs::read_to_string(&backup).unwrap(), "old");
    }

    #[test]
    fn test_finish_replace() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("movies.csv");
        fs::write(&output, "old").unwrap();
        let mut pending = PendingOutput::create(&output, 2).unwrap();
        pending.write_all(b"new").unwrap();
        assert_eq!(pending.finish(3).unwrap(), FinishOutcome::Written);
        assert_eq!(fs::read_to_string(&output).unwrap(), "new");
        assert!(!dir.path().join("movies.csv.bak").exists());
    }
}
