#![forbid(unsafe_code)]

//! Subtree Pruner (stp) — prunes stale entries from a temp directory tree.
//!
//! Files and directories are deleted only once an entire subtree has aged
//! out; files directly inside the configured root are the one exception and
//! expire individually. Evaluation is fail-safe: any entry that cannot be
//! probed pins its whole ancestor chain to "keep".
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use subtree_pruner::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use subtree_pruner::pruner::evaluate::TreeEvaluator;
//! use subtree_pruner::pruner::fs::RealFs;
//! ```

pub mod prelude;

pub mod core;
pub mod logger;
pub mod pruner;
