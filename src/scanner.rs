use jwalk::WalkDir;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::ScanConfig;
use crate::error::{Error, Result};
use crate::tree::{Entry, NodeKind};

const PROGRESS_EMIT_INTERVAL_MS: u128 = 100;

#[derive(Debug, Clone, Default)]
pub struct ScanStats {
    pub total_files: u64,
    pub total_dirs: u64,
    /// Entries the walker could not read.
    pub unreadable: u64,
    pub duration_ms: u128,
}

#[derive(Debug, Clone, Copy)]
pub struct ScanProgress {
    pub discovered_entries: u64,
    pub done: bool,
}

pub type ProgressReporter = Arc<dyn Fn(ScanProgress) + Send + Sync>;

/// Parallel filesystem walker producing the flat entry list for a snapshot.
pub struct Scanner {
    walk_threads: usize,
}

impl Scanner {
    pub fn new() -> Self {
        Self {
            walk_threads: Self::walk_parallelism(),
        }
    }

    fn walk_parallelism() -> usize {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        (cores * 2).clamp(4, 64)
    }

    fn is_skipped(name: &OsStr, ignored: &HashSet<String>, skip_hidden: bool) -> bool {
        let name = name.to_string_lossy();
        (skip_hidden && name.starts_with('.')) || ignored.contains(name.as_ref())
    }

    pub fn scan<P: AsRef<Path>>(&self, root: P, config: &ScanConfig) -> Result<(Vec<Entry>, ScanStats)> {
        self.scan_with_progress(root, config, None)
    }

    /// Walk `root` down to `config.max_depth` levels (its children are level 1).
    ///
    /// The root itself is not part of the result.
    pub fn scan_with_progress<P: AsRef<Path>>(
        &self,
        root: P,
        config: &ScanConfig,
        reporter: Option<ProgressReporter>,
    ) -> Result<(Vec<Entry>, ScanStats)> {
        let root_path = root.as_ref().to_path_buf();
        if !root_path.is_dir() {
            return Err(Error::RootNotFound(root_path));
        }

        let start = Instant::now();
        let ignored: HashSet<String> = config.ignored.iter().cloned().collect();
        let skip_hidden = config.skip_hidden;

        let walker = WalkDir::new(&root_path)
            .skip_hidden(skip_hidden)
            .max_depth(config.max_depth)
            .sort(true)
            .parallelism(jwalk::Parallelism::RayonNewPool(self.walk_threads))
            .process_read_dir(move |_, _, _, children| {
                children.retain(|entry| {
                    entry
                        .as_ref()
                        .map(|dir_entry| !Self::is_skipped(dir_entry.file_name(), &ignored, skip_hidden))
                        .unwrap_or(true)
                });
            });

        let mut entries = Vec::new();
        let mut stats = ScanStats::default();
        let mut last_emit = Instant::now();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "unreadable entry skipped");
                    stats.unreadable += 1;
                    continue;
                }
            };
            if entry.depth == 0 {
                continue;
            }

            let kind = if entry.file_type().is_dir() {
                stats.total_dirs += 1;
                NodeKind::Directory
            } else {
                stats.total_files += 1;
                NodeKind::File
            };
            entries.push(Entry::new(entry.path(), kind));

            if let Some(cb) = reporter.as_ref() {
                if last_emit.elapsed().as_millis() >= PROGRESS_EMIT_INTERVAL_MS {
                    last_emit = Instant::now();
                    cb(ScanProgress {
                        discovered_entries: entries.len() as u64,
                        done: false,
                    });
                }
            }
        }

        if let Some(cb) = reporter.as_ref() {
            cb(ScanProgress {
                discovered_entries: entries.len() as u64,
                done: true,
            });
        }

        stats.duration_ms = start.elapsed().as_millis();
        info!(
            root = %root_path.display(),
            files = stats.total_files,
            dirs = stats.total_dirs,
            duration_ms = stats.duration_ms as u64,
            "scan finished"
        );
        Ok((entries, stats))
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::Builder::new().prefix("scan").tempdir().unwrap();
        let root = dir.path();
        for file in [
            "src/main.rs",
            "src/lib.rs",
            "src/deep/a/b/c.rs",
            "node_modules/pkg/index.js",
            ".git/HEAD",
            ".env",
            "README.md",
        ] {
            let path = root.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, "x").unwrap();
        }
        dir
    }

    fn relative(entries: &[Entry], root: &Path) -> Vec<(PathBuf, NodeKind)> {
        let mut out: Vec<_> = entries
            .iter()
            .map(|e| (e.path.strip_prefix(root).unwrap().to_path_buf(), e.kind))
            .collect();
        out.sort();
        out
    }

    #[test]
    fn test_scan_skips_ignored_and_hidden() {
        let dir = fixture();
        let (entries, stats) = Scanner::new().scan(dir.path(), &ScanConfig::default()).unwrap();
        let found = relative(&entries, dir.path());

        assert!(found.contains(&(PathBuf::from("src"), NodeKind::Directory)));
        assert!(found.contains(&(PathBuf::from("src/deep/a/b/c.rs"), NodeKind::File)));
        assert!(found.contains(&(PathBuf::from("README.md"), NodeKind::File)));
        assert!(found.iter().all(|(p, _)| !p.starts_with("node_modules")));
        assert!(found.iter().all(|(p, _)| !p.starts_with(".git")));
        assert!(!found.iter().any(|(p, _)| p == Path::new(".env")));
        assert_eq!(stats.total_files + stats.total_dirs, entries.len() as u64);
    }

    #[test]
    fn test_scan_respects_depth() {
        let dir = fixture();
        let config = ScanConfig {
            max_depth: 1,
            ..ScanConfig::default()
        };
        let (entries, _) = Scanner::new().scan(dir.path(), &config).unwrap();
        let found = relative(&entries, dir.path());

        assert_eq!(
            found,
            vec![
                (PathBuf::from("README.md"), NodeKind::File),
                (PathBuf::from("src"), NodeKind::Directory),
            ]
        );
    }

    #[test]
    fn test_hidden_entries_kept_when_allowed() {
        let dir = fixture();
        let config = ScanConfig {
            skip_hidden: false,
            ..ScanConfig::default()
        };
        let (entries, _) = Scanner::new().scan(dir.path(), &config).unwrap();
        let found = relative(&entries, dir.path());

        assert!(found.contains(&(PathBuf::from(".env"), NodeKind::File)));
        // Still ignored by name
        assert!(found.iter().all(|(p, _)| !p.starts_with(".git")));
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let result = Scanner::new().scan("/definitely/not/here", &ScanConfig::default());
        assert!(matches!(result, Err(Error::RootNotFound(_))));
    }

    #[test]
    fn test_progress_reports_completion() {
        let dir = fixture();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let reporter: ProgressReporter = Arc::new(move |progress: ScanProgress| {
            if progress.done {
                flag.store(true, Ordering::SeqCst);
            }
        });

        Scanner::new()
            .scan_with_progress(dir.path(), &ScanConfig::default(), Some(reporter))
            .unwrap();
        assert!(finished.load(Ordering::SeqCst));
    }
}
