//! The pruning core: threshold gate, filesystem interface, tree evaluation,
//! and verdict execution.

pub mod apply;
pub mod evaluate;
pub mod fs;
pub mod gate;
