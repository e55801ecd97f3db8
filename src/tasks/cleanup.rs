//! Removal of a task's work directory, sparing excluded paths.

use std::io;
use std::path::{Path, PathBuf};

use tracing::trace;

/// Recursively removes `dir`, except entries listed in `keep`.
///
/// `keep` entries may be absolute or relative to `dir`. Directories on the
/// way to a kept path survive; everything else under `dir` is deleted.
pub(crate) async fn remove_work_dir(dir: &Path, keep: Vec<PathBuf>) -> io::Result<()> {
    let dir = dir.to_path_buf();
    let keep: Vec<PathBuf> = keep
        .into_iter()
        .map(|p| if p.is_absolute() { p } else { dir.join(p) })
        .collect();

    tokio::task::spawn_blocking(move || {
        if !dir.exists() {
            return Ok(());
        }
        if keep.is_empty() {
            return std::fs::remove_dir_all(&dir);
        }
        prune(&dir, &keep).map(drop)
    })
    .await
    .map_err(io::Error::other)?
}

/// Deletes everything under `dir` not covered by `keep`; returns whether `dir` itself survived.
fn prune(dir: &Path, keep: &[PathBuf]) -> io::Result<bool> {
    let mut survived = false;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if keep.iter().any(|k| k == &path) {
            survived = true;
            continue;
        }
        if path.is_dir() && keep.iter().any(|k| k.starts_with(&path)) {
            survived |= prune(&path, keep)?;
            continue;
        }
        trace!(path = %path.display(), "removing");
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    if !survived {
        std::fs::remove_dir(dir)?;
    }
    Ok(survived)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn removes_everything_without_exclusions() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("work");
        fs::create_dir_all(dir.join("a/b")).unwrap();
        fs::write(dir.join("a/b/f"), "x").unwrap();

        remove_work_dir(&dir, Vec::new()).await.unwrap();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn keeps_excluded_paths_and_their_parents() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("work");
        fs::create_dir_all(dir.join("out/deep")).unwrap();
        fs::create_dir_all(dir.join("tmp")).unwrap();
        fs::write(dir.join("out/deep/witness.graphml"), "w").unwrap();
        fs::write(dir.join("out/scratch"), "s").unwrap();
        fs::write(dir.join("tmp/x"), "x").unwrap();
        fs::write(dir.join("task.log"), "log").unwrap();

        remove_work_dir(
            &dir,
            vec![PathBuf::from("out/deep/witness.graphml"), dir.join("task.log")],
        )
        .await
        .unwrap();

        assert!(dir.join("out/deep/witness.graphml").exists());
        assert!(dir.join("task.log").exists());
        assert!(!dir.join("out/scratch").exists());
        assert!(!dir.join("tmp").exists());
    }

    #[tokio::test]
    async fn missing_dir_is_fine() {
        let root = TempDir::new().unwrap();
        remove_work_dir(&root.path().join("never"), Vec::new())
            .await
            .unwrap();
    }
}
