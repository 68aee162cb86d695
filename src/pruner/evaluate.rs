//! Tree evaluator: bottom-up expiration classification and deletion verdicts.
//!
//! The evaluator walks the configured root post-order, classifies each file
//! against the threshold gate, and aggregates child classifications into a
//! per-directory verdict. A non-root subtree is deletable only when every
//! descendant file beneath it has aged out; files directly inside the root
//! are the one exception and expire individually.
//!
//! Fail-safe rule: any probe or listing failure pins the affected node — and
//! through the bottom-up conjunction, every ancestor — to not-expired.
//! Uncertain state is never deleted; the failure is reported instead.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

use crossbeam_channel as channel;
use parking_lot::Mutex;

use crate::core::errors::{Result, StpError};
use crate::pruner::fs::{EntryKind, Filesystem};
use crate::pruner::gate;

/// Final per-node action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Delete,
    Keep,
}

/// One evaluated filesystem entry.
///
/// `expired` is the intermediate classification: for files, both timestamps
/// aged out; for directories, every child expired (vacuously true when there
/// are no descendant files) and no error anywhere beneath.
#[derive(Debug, Clone)]
pub struct Node {
    pub path: PathBuf,
    pub kind: EntryKind,
    /// True only for entries whose immediate parent is the configured root.
    pub root_child: bool,
    pub expired: bool,
    pub verdict: Verdict,
    pub children: Vec<Node>,
}

impl Node {
    #[must_use]
    pub const fn is_delete(&self) -> bool {
        matches!(self.verdict, Verdict::Delete)
    }
}

/// A per-path failure recorded during evaluation.
#[derive(Debug)]
pub struct EvalError {
    pub path: PathBuf,
    pub error: StpError,
}

/// Result of one evaluation pass: the verdict tree plus collected failures.
#[derive(Debug)]
pub struct Evaluation {
    pub root: Node,
    pub errors: Vec<EvalError>,
}

impl Evaluation {
    /// Root-child entries marked for deletion. Deletion decisions are made at
    /// root-child granularity, so these are exactly the doomed subtree heads.
    #[must_use]
    pub fn doomed(&self) -> Vec<&Node> {
        self.root.children.iter().filter(|n| n.is_delete()).collect()
    }
}

/// Recursive, bottom-up tree evaluator.
///
/// Root-child subtrees are independent by construction, so they are evaluated
/// fork-join across a bounded worker pool, with the parent's aggregate
/// computed only after every subtree task has joined. Verdicts are written
/// exactly once; the only shared state is the error sink.
pub struct TreeEvaluator<F> {
    fs: F,
    max_age: Duration,
    now: SystemTime,
    parallelism: usize,
}

impl<F: Filesystem + Sync> TreeEvaluator<F> {
    pub fn new(fs: F, max_age: Duration) -> Self {
        Self {
            fs,
            max_age,
            now: SystemTime::now(),
            parallelism: 0,
        }
    }

    /// Pin the evaluation clock (tests inject a fixed `now`).
    #[must_use]
    pub const fn with_now(mut self, now: SystemTime) -> Self {
        self.now = now;
        self
    }

    /// Bound the evaluation fan-out to at most `workers` threads.
    /// 0 means one worker per root child; 1 evaluates sequentially.
    #[must_use]
    pub const fn with_parallelism(mut self, workers: usize) -> Self {
        self.parallelism = workers;
        self
    }

    /// Evaluate the tree rooted at `root`.
    ///
    /// Precondition: `root` must exist and be a directory; anything else is a
    /// fatal [`StpError::RootMissing`] reported before any traversal.
    pub fn evaluate(&self, root: &Path) -> Result<Evaluation> {
        let stat = self.fs.stat(root).map_err(|_| StpError::RootMissing {
            path: root.to_path_buf(),
        })?;
        if stat.kind != EntryKind::Directory {
            return Err(StpError::RootMissing {
                path: root.to_path_buf(),
            });
        }

        let errors = Mutex::new(Vec::new());
        let children = match self.fs.list(root) {
            Ok(paths) => self.classify_root_children(&paths, &errors),
            Err(error) => {
                // The root listing itself failing leaves nothing to prune.
                errors.lock().push(EvalError {
                    path: root.to_path_buf(),
                    error,
                });
                Vec::new()
            }
        };

        // The configured root is always kept, whatever its contents.
        let root_node = Node {
            path: root.to_path_buf(),
            kind: EntryKind::Directory,
            root_child: false,
            expired: false,
            verdict: Verdict::Keep,
            children,
        };

        Ok(Evaluation {
            root: root_node,
            errors: errors.into_inner(),
        })
    }

    /// Classify each root child in its own task, preserving listing order.
    fn classify_root_children(
        &self,
        paths: &[PathBuf],
        errors: &Mutex<Vec<EvalError>>,
    ) -> Vec<Node> {
        let workers = match self.parallelism {
            0 => paths.len(),
            bound => bound.min(paths.len()),
        };
        let mut nodes = if workers > 1 {
            // Work queue per the fan-out bound: seeded up front and closed,
            // so workers drain it and exit when it runs dry.
            let (work_tx, work_rx) = channel::unbounded::<(usize, &PathBuf)>();
            for item in paths.iter().enumerate() {
                let _ = work_tx.send(item);
            }
            drop(work_tx);

            let (result_tx, result_rx) = channel::unbounded::<(usize, Node)>();
            thread::scope(|scope| {
                for _ in 0..workers {
                    let work_rx = work_rx.clone();
                    let result_tx = result_tx.clone();
                    scope.spawn(move || {
                        while let Ok((index, path)) = work_rx.recv() {
                            let node = self.classify(path, true, errors);
                            // Receiver outlives the scope; a send failure
                            // would mean the whole evaluation is being torn
                            // down.
                            let _ = result_tx.send((index, node));
                        }
                    });
                }
            });
            drop(result_tx);
            result_rx.into_iter().collect::<Vec<_>>()
        } else {
            paths
                .iter()
                .enumerate()
                .map(|(index, path)| (index, self.classify(path, true, errors)))
                .collect()
        };
        nodes.sort_by_key(|(index, _)| *index);

        let mut children: Vec<Node> = nodes.into_iter().map(|(_, node)| node).collect();
        for child in &mut children {
            assign_verdicts(child);
        }
        children
    }

    /// Post-order classification of one entry.
    ///
    /// Returns a node whose `expired` flag already folds in the fail-safe
    /// rule: probe/list failures yield `expired = false`, which the parent's
    /// conjunction then carries all the way up.
    fn classify(&self, path: &Path, root_child: bool, errors: &Mutex<Vec<EvalError>>) -> Node {
        let stat = match self.fs.stat(path) {
            Ok(stat) => stat,
            Err(error) => {
                errors.lock().push(EvalError {
                    path: path.to_path_buf(),
                    error,
                });
                return Node {
                    path: path.to_path_buf(),
                    kind: EntryKind::File,
                    root_child,
                    expired: false,
                    verdict: Verdict::Keep,
                    children: Vec::new(),
                };
            }
        };

        match stat.kind {
            EntryKind::File => Node {
                path: path.to_path_buf(),
                kind: EntryKind::File,
                root_child,
                expired: gate::entry_expired(stat.mtime, stat.atime, self.now, self.max_age),
                verdict: Verdict::Keep,
                children: Vec::new(),
            },
            EntryKind::Directory => {
                let (children, expired) = match self.fs.list(path) {
                    Ok(child_paths) => {
                        let children: Vec<Node> = child_paths
                            .iter()
                            .map(|child| self.classify(child, false, errors))
                            .collect();
                        // Conjunction over children; empty listing is
                        // vacuously all-expired (deliberate policy, see
                        // DESIGN.md). Errored children carry expired=false,
                        // so any failure beneath forces this to false too.
                        let expired = children.iter().all(|c| c.expired);
                        (children, expired)
                    }
                    Err(error) => {
                        errors.lock().push(EvalError {
                            path: path.to_path_buf(),
                            error,
                        });
                        (Vec::new(), false)
                    }
                };
                Node {
                    path: path.to_path_buf(),
                    kind: EntryKind::Directory,
                    root_child,
                    expired,
                    verdict: Verdict::Keep,
                    children,
                }
            }
        }
    }
}

/// Assign final verdicts to a root-child subtree.
///
/// A root-child file is deleted on its own expiration. A root-child
/// directory's verdict is exactly its aggregate classification, and that
/// verdict propagates uniformly to every descendant: nested entries are never
/// decided by their individual timestamps.
fn assign_verdicts(root_child: &mut Node) {
    let verdict = if root_child.expired {
        Verdict::Delete
    } else {
        Verdict::Keep
    };
    propagate(root_child, verdict);
}

fn propagate(node: &mut Node, verdict: Verdict) {
    node.verdict = verdict;
    for child in &mut node.children {
        propagate(child, verdict);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::ErrorKind;

    const WEEK: Duration = Duration::from_secs(7 * 86_400);

    /// In-memory filesystem for verdict tests with injectable failures.
    #[derive(Default)]
    struct MockFs {
        dirs: HashMap<PathBuf, Vec<PathBuf>>,
        files: HashMap<PathBuf, (SystemTime, SystemTime)>,
        unreadable: Vec<PathBuf>,
        unlistable: Vec<PathBuf>,
    }

    impl MockFs {
        fn dir(mut self, path: &str, children: &[&str]) -> Self {
            self.dirs.insert(
                PathBuf::from(path),
                children.iter().map(PathBuf::from).collect(),
            );
            self
        }

        fn file(mut self, path: &str, mtime: SystemTime, atime: SystemTime) -> Self {
            self.files.insert(PathBuf::from(path), (mtime, atime));
            self
        }

        fn unreadable(mut self, path: &str) -> Self {
            self.unreadable.push(PathBuf::from(path));
            self
        }

        fn unlistable(mut self, path: &str) -> Self {
            self.unlistable.push(PathBuf::from(path));
            self
        }
    }

    impl Filesystem for MockFs {
        fn stat(&self, path: &Path) -> crate::core::errors::Result<crate::pruner::fs::EntryStat> {
            use crate::pruner::fs::EntryStat;
            if self.unreadable.iter().any(|p| p == path) {
                return Err(StpError::Probe {
                    path: path.to_path_buf(),
                    source: std::io::Error::from(ErrorKind::PermissionDenied),
                });
            }
            if let Some(&(mtime, atime)) = self.files.get(path) {
                return Ok(EntryStat {
                    kind: EntryKind::File,
                    mtime,
                    atime,
                });
            }
            if self.dirs.contains_key(path) || self.unlistable.iter().any(|p| p == path) {
                return Ok(EntryStat {
                    kind: EntryKind::Directory,
                    mtime: SystemTime::UNIX_EPOCH,
                    atime: SystemTime::UNIX_EPOCH,
                });
            }
            Err(StpError::Probe {
                path: path.to_path_buf(),
                source: std::io::Error::from(ErrorKind::NotFound),
            })
        }

        fn list(&self, path: &Path) -> crate::core::errors::Result<Vec<PathBuf>> {
            if self.unlistable.iter().any(|p| p == path) {
                return Err(StpError::List {
                    path: path.to_path_buf(),
                    source: std::io::Error::from(ErrorKind::PermissionDenied),
                });
            }
            self.dirs.get(path).cloned().ok_or_else(|| StpError::List {
                path: path.to_path_buf(),
                source: std::io::Error::from(ErrorKind::NotFound),
            })
        }

        fn remove_file(&self, _path: &Path) -> crate::core::errors::Result<()> {
            unimplemented!("evaluation never removes")
        }

        fn remove_dir(&self, _path: &Path) -> crate::core::errors::Result<()> {
            unimplemented!("evaluation never removes")
        }
    }

    fn now() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(100_000_000)
    }

    fn old() -> SystemTime {
        now() - WEEK - Duration::from_secs(1)
    }

    fn fresh() -> SystemTime {
        now() - Duration::from_secs(60)
    }

    fn find<'a>(node: &'a Node, path: &str) -> &'a Node {
        fn walk<'a>(node: &'a Node, path: &Path) -> Option<&'a Node> {
            if node.path == path {
                return Some(node);
            }
            node.children.iter().find_map(|c| walk(c, path))
        }
        walk(node, Path::new(path)).expect("node present")
    }

    fn eval(fs: MockFs) -> Evaluation {
        TreeEvaluator::new(fs, WEEK)
            .with_now(now())
            .evaluate(Path::new("/tmp/root"))
            .unwrap()
    }

    /// The worked scenario from the defining use case.
    #[test]
    fn mixed_tree_prunes_only_fully_expired_subtrees() {
        let fs = MockFs::default()
            .dir("/tmp/root", &[
                "/tmp/root/foo",
                "/tmp/root/bar",
                "/tmp/root/fileD.txt",
            ])
            .dir("/tmp/root/foo", &["/tmp/root/foo/fileA.txt", "/tmp/root/foo/fileB.txt"])
            .dir("/tmp/root/bar", &["/tmp/root/bar/fileC.txt"])
            .file("/tmp/root/foo/fileA.txt", old(), old())
            .file("/tmp/root/foo/fileB.txt", fresh(), fresh())
            .file("/tmp/root/bar/fileC.txt", old(), old())
            .file("/tmp/root/fileD.txt", old(), old());

        let result = eval(fs);
        assert!(result.errors.is_empty());

        assert_eq!(result.root.verdict, Verdict::Keep);
        assert_eq!(find(&result.root, "/tmp/root/bar").verdict, Verdict::Delete);
        assert_eq!(
            find(&result.root, "/tmp/root/bar/fileC.txt").verdict,
            Verdict::Delete
        );
        assert_eq!(
            find(&result.root, "/tmp/root/fileD.txt").verdict,
            Verdict::Delete
        );
        assert_eq!(find(&result.root, "/tmp/root/foo").verdict, Verdict::Keep);
        // fileA is expired, but its subtree is not: it stays.
        assert_eq!(
            find(&result.root, "/tmp/root/foo/fileA.txt").verdict,
            Verdict::Keep
        );
        assert_eq!(
            find(&result.root, "/tmp/root/foo/fileB.txt").verdict,
            Verdict::Keep
        );

        let doomed: Vec<_> = result.doomed().iter().map(|n| n.path.clone()).collect();
        assert_eq!(
            doomed,
            vec![
                PathBuf::from("/tmp/root/bar"),
                PathBuf::from("/tmp/root/fileD.txt"),
            ]
        );
    }

    #[test]
    fn root_child_files_expire_independently_of_siblings() {
        let fs = MockFs::default()
            .dir("/tmp/root", &["/tmp/root/a.txt", "/tmp/root/b.txt"])
            .file("/tmp/root/a.txt", old(), old())
            .file("/tmp/root/b.txt", fresh(), fresh());

        let result = eval(fs);
        assert_eq!(find(&result.root, "/tmp/root/a.txt").verdict, Verdict::Delete);
        assert_eq!(find(&result.root, "/tmp/root/b.txt").verdict, Verdict::Keep);
    }

    #[test]
    fn one_fresh_timestamp_keeps_a_file_alive() {
        let fs = MockFs::default()
            .dir("/tmp/root", &["/tmp/root/d"])
            .dir("/tmp/root/d", &["/tmp/root/d/f"])
            .file("/tmp/root/d/f", old(), fresh());

        let result = eval(fs);
        assert_eq!(find(&result.root, "/tmp/root/d").verdict, Verdict::Keep);
    }

    #[test]
    fn deep_nesting_aggregates_to_the_root_child() {
        let fs = MockFs::default()
            .dir("/tmp/root", &["/tmp/root/a"])
            .dir("/tmp/root/a", &["/tmp/root/a/b"])
            .dir("/tmp/root/a/b", &["/tmp/root/a/b/c", "/tmp/root/a/b/old.txt"])
            .dir("/tmp/root/a/b/c", &["/tmp/root/a/b/c/fresh.txt"])
            .file("/tmp/root/a/b/old.txt", old(), old())
            .file("/tmp/root/a/b/c/fresh.txt", fresh(), fresh());

        let result = eval(fs);
        // One fresh file three levels down pins the whole subtree.
        assert_eq!(find(&result.root, "/tmp/root/a").verdict, Verdict::Keep);
        assert_eq!(
            find(&result.root, "/tmp/root/a/b/old.txt").verdict,
            Verdict::Keep
        );
    }

    #[test]
    fn empty_subtree_is_vacuously_deletable() {
        let fs = MockFs::default()
            .dir("/tmp/root", &["/tmp/root/empty", "/tmp/root/nested"])
            .dir("/tmp/root/empty", &[])
            .dir("/tmp/root/nested", &["/tmp/root/nested/inner"])
            .dir("/tmp/root/nested/inner", &[]);

        let result = eval(fs);
        assert_eq!(find(&result.root, "/tmp/root/empty").verdict, Verdict::Delete);
        assert_eq!(find(&result.root, "/tmp/root/nested").verdict, Verdict::Delete);
        assert_eq!(
            find(&result.root, "/tmp/root/nested/inner").verdict,
            Verdict::Delete
        );
    }

    #[test]
    fn probe_failure_pins_ancestors_to_keep() {
        let fs = MockFs::default()
            .dir("/tmp/root", &["/tmp/root/d"])
            .dir("/tmp/root/d", &["/tmp/root/d/old.txt", "/tmp/root/d/locked"])
            .file("/tmp/root/d/old.txt", old(), old())
            .unreadable("/tmp/root/d/locked");

        let result = eval(fs);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].path, PathBuf::from("/tmp/root/d/locked"));
        assert_eq!(result.errors[0].error.code(), "STP-2001");
        // Everything above the unreadable entry survives.
        assert_eq!(find(&result.root, "/tmp/root/d").verdict, Verdict::Keep);
        assert_eq!(
            find(&result.root, "/tmp/root/d/old.txt").verdict,
            Verdict::Keep
        );
    }

    #[test]
    fn list_failure_pins_ancestors_to_keep() {
        let fs = MockFs::default()
            .dir("/tmp/root", &["/tmp/root/d"])
            .dir("/tmp/root/d", &["/tmp/root/d/sealed", "/tmp/root/d/old.txt"])
            .file("/tmp/root/d/old.txt", old(), old())
            .unlistable("/tmp/root/d/sealed");

        let result = eval(fs);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].error.code(), "STP-2002");
        assert_eq!(find(&result.root, "/tmp/root/d").verdict, Verdict::Keep);
        // An unlistable directory would otherwise be vacuously deletable;
        // the failure must override that.
        assert_eq!(
            find(&result.root, "/tmp/root/d/sealed").verdict,
            Verdict::Keep
        );
    }

    #[test]
    fn root_is_always_kept_even_when_fully_expired() {
        let fs = MockFs::default()
            .dir("/tmp/root", &["/tmp/root/a.txt"])
            .file("/tmp/root/a.txt", old(), old());

        let result = eval(fs);
        assert_eq!(result.root.verdict, Verdict::Keep);
        assert!(!result.root.is_delete());
    }

    #[test]
    fn missing_root_is_fatal() {
        let fs = MockFs::default();
        let err = TreeEvaluator::new(fs, WEEK)
            .with_now(now())
            .evaluate(Path::new("/tmp/root"))
            .unwrap_err();
        assert_eq!(err.code(), "STP-1101");
    }

    #[test]
    fn file_root_is_fatal() {
        let fs = MockFs::default().file("/tmp/root", old(), old());
        let err = TreeEvaluator::new(fs, WEEK)
            .with_now(now())
            .evaluate(Path::new("/tmp/root"))
            .unwrap_err();
        assert_eq!(err.code(), "STP-1101");
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let build = || {
            MockFs::default()
                .dir("/tmp/root", &["/tmp/root/a", "/tmp/root/b", "/tmp/root/c.txt"])
                .dir("/tmp/root/a", &["/tmp/root/a/x"])
                .dir("/tmp/root/b", &["/tmp/root/b/y"])
                .file("/tmp/root/a/x", old(), old())
                .file("/tmp/root/b/y", fresh(), fresh())
                .file("/tmp/root/c.txt", old(), old())
        };

        let par = TreeEvaluator::new(build(), WEEK)
            .with_now(now())
            .evaluate(Path::new("/tmp/root"))
            .unwrap();
        let seq = TreeEvaluator::new(build(), WEEK)
            .with_now(now())
            .with_parallelism(1)
            .evaluate(Path::new("/tmp/root"))
            .unwrap();

        let verdicts = |e: &Evaluation| -> Vec<(PathBuf, Verdict)> {
            e.root
                .children
                .iter()
                .map(|n| (n.path.clone(), n.verdict))
                .collect()
        };
        assert_eq!(verdicts(&par), verdicts(&seq));
    }

    /// Counts in-flight stat calls so tests can observe the worker bound.
    struct GaugedFs {
        inner: MockFs,
        current: std::sync::Arc<std::sync::atomic::AtomicUsize>,
        peak: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    }

    impl Filesystem for GaugedFs {
        fn stat(&self, path: &Path) -> crate::core::errors::Result<crate::pruner::fs::EntryStat> {
            use std::sync::atomic::Ordering;
            let in_flight = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(in_flight, Ordering::SeqCst);
            // Hold the slot briefly so concurrent workers overlap.
            std::thread::sleep(Duration::from_millis(5));
            let result = self.inner.stat(path);
            self.current.fetch_sub(1, Ordering::SeqCst);
            result
        }

        fn list(&self, path: &Path) -> crate::core::errors::Result<Vec<PathBuf>> {
            self.inner.list(path)
        }

        fn remove_file(&self, path: &Path) -> crate::core::errors::Result<()> {
            self.inner.remove_file(path)
        }

        fn remove_dir(&self, path: &Path) -> crate::core::errors::Result<()> {
            self.inner.remove_dir(path)
        }
    }

    fn wide_root(file_count: usize) -> MockFs {
        let children: Vec<String> = (0..file_count)
            .map(|i| format!("/tmp/root/f{i}.txt"))
            .collect();
        let refs: Vec<&str> = children.iter().map(String::as_str).collect();
        let mut fs = MockFs::default().dir("/tmp/root", &refs);
        for child in &children {
            fs = fs.file(child, old(), old());
        }
        fs
    }

    fn peak_fan_out(parallelism: usize, file_count: usize) -> usize {
        let current = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let peak = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let fs = GaugedFs {
            inner: wide_root(file_count),
            current: std::sync::Arc::clone(&current),
            peak: std::sync::Arc::clone(&peak),
        };

        let result = TreeEvaluator::new(fs, WEEK)
            .with_now(now())
            .with_parallelism(parallelism)
            .evaluate(Path::new("/tmp/root"))
            .unwrap();
        assert_eq!(result.root.children.len(), file_count);

        peak.load(std::sync::atomic::Ordering::SeqCst)
    }

    #[test]
    fn parallelism_one_evaluates_sequentially() {
        assert_eq!(peak_fan_out(1, 6), 1);
    }

    #[test]
    fn fan_out_never_exceeds_the_configured_bound() {
        assert!(peak_fan_out(2, 8) <= 2);
        assert!(peak_fan_out(3, 8) <= 3);
    }
}
