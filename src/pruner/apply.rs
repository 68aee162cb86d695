//! Prune executor: deepest-first removal of doomed subtrees.
//!
//! Files go before their parent directory, and a directory is only removed
//! once every child beneath it reported success. A failed child therefore
//! blocks every ancestor's removal for the rest of the run; the failure is
//! recorded and sibling subtrees continue. Nothing is retried within a run.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::core::errors::StpError;
use crate::pruner::evaluate::{Evaluation, Node};
use crate::pruner::fs::{EntryKind, Filesystem};

/// A single removal failure record.
#[derive(Debug, Clone)]
pub struct PruneFailure {
    pub path: PathBuf,
    pub error: String,
    pub error_code: String,
    pub recoverable: bool,
}

/// Summary of one prune pass.
#[derive(Debug, Clone, Default)]
pub struct PruneReport {
    pub deleted: Vec<PathBuf>,
    pub failed: Vec<PruneFailure>,
    pub dry_run: bool,
    pub duration: Duration,
}

impl PruneReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Executes deletion verdicts against the filesystem.
pub struct Pruner<F> {
    fs: F,
    dry_run: bool,
}

impl<F: Filesystem> Pruner<F> {
    pub const fn new(fs: F) -> Self {
        Self { fs, dry_run: false }
    }

    /// Plan only: record what would be removed without touching anything.
    #[must_use]
    pub const fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Apply the verdicts of an evaluation pass.
    ///
    /// The configured root is never a candidate (its verdict is Keep by
    /// construction); only root-child subtrees marked Delete are visited.
    pub fn apply(&self, evaluation: &Evaluation) -> PruneReport {
        let start = Instant::now();
        let mut report = PruneReport {
            dry_run: self.dry_run,
            ..PruneReport::default()
        };

        for child in &evaluation.root.children {
            if child.is_delete() {
                self.remove_subtree(child, &mut report);
            }
        }

        report.duration = start.elapsed();
        report
    }

    /// Post-order removal. Returns true iff the whole subtree is gone.
    fn remove_subtree(&self, node: &Node, report: &mut PruneReport) -> bool {
        match node.kind {
            EntryKind::File => self.remove_one(node, report, |fs, path| fs.remove_file(path)),
            EntryKind::Directory => {
                let mut children_gone = true;
                for child in &node.children {
                    // No short-circuit: siblings are still attempted so one
                    // stuck file doesn't shadow the rest of the subtree.
                    children_gone &= self.remove_subtree(child, report);
                }
                if !children_gone {
                    // A failed child must block the ancestor; attempting the
                    // rmdir anyway would just add a noise failure.
                    return false;
                }
                self.remove_one(node, report, |fs, path| fs.remove_dir(path))
            }
        }
    }

    fn remove_one(
        &self,
        node: &Node,
        report: &mut PruneReport,
        remove: impl Fn(&F, &std::path::Path) -> crate::core::errors::Result<()>,
    ) -> bool {
        if self.dry_run {
            report.deleted.push(node.path.clone());
            return true;
        }
        match remove(&self.fs, &node.path) {
            Ok(()) => {
                report.deleted.push(node.path.clone());
                true
            }
            Err(error) => {
                report.failed.push(failure_record(&node.path, &error));
                false
            }
        }
    }
}

fn failure_record(path: &std::path::Path, error: &StpError) -> PruneFailure {
    PruneFailure {
        path: path.to_path_buf(),
        error: error.to_string(),
        error_code: error.code().to_string(),
        recoverable: error.is_retryable(),
    }
}
