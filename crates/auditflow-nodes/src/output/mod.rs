//! Output nodes
//!
//! Nodes that export results.

mod json_output;

pub use json_output::{JsonOutputConfig, JsonOutputNode};
