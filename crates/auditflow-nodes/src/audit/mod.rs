//! Audit nodes
//!
//! Nodes that scan imported records and emit a `risk_set` of findings.

mod threshold;

pub use threshold::{AmountThresholdNode, ThresholdConfig, ThresholdMode};
