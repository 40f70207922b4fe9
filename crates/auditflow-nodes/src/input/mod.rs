//! Input nodes
//!
//! Nodes that introduce data into a graph.

mod constant;

pub use constant::{ConstantConfig, ConstantNode};
