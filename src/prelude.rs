//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use subtree_pruner::prelude::*;
//! ```

// Core
pub use crate::core::config::{Config, parse_age};
pub use crate::core::errors::{Result, StpError};

// Pruner
pub use crate::pruner::apply::{PruneFailure, PruneReport, Pruner};
pub use crate::pruner::evaluate::{Evaluation, Node, TreeEvaluator, Verdict};
pub use crate::pruner::fs::{EntryKind, EntryStat, Filesystem, RealFs};
pub use crate::pruner::gate::{entry_expired, is_expired};

// Logger
pub use crate::logger::jsonl::{ActivityEvent, ActivityLogger};
