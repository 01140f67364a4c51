#![forbid(unsafe_code)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static RUN_SEQ: AtomicU64 = AtomicU64::new(0);

/// A per-run scratch directory. Removed on drop unless the run asked to keep
/// it; concurrent runs get distinct names, so they never share scratch state.
pub struct Workdir {
    path: PathBuf,
    keep: bool,
}

impl Workdir {
    pub fn create(cleanup: bool) -> io::Result<Workdir> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        let path = std::env::temp_dir().join(format!(
            "tempo-run-{}-{}-{nanos}",
            std::process::id(),
            RUN_SEQ.fetch_add(1, Ordering::Relaxed),
        ));
        fs::create_dir_all(&path)?;
        Ok(Workdir {
            path,
            keep: !cleanup,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist a source file; the file is fully written before this returns,
    /// so a back-end spawned afterwards always sees complete input.
    pub fn write_source(&self, name: &str, contents: &str) -> io::Result<PathBuf> {
        let path = self.path.join(name);
        fs::write(&path, contents)?;
        Ok(path)
    }
}

impl Drop for Workdir {
    fn drop(&mut self) {
        if !self.keep {
            let _ = fs::remove_dir_all(&self.path);
        }
    }
}
