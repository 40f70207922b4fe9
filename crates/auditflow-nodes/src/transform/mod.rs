//! Transform nodes
//!
//! Nodes that reshape or combine values.

mod offset;
mod pass_through;
mod sum;

pub use offset::{OffsetConfig, OffsetNode};
pub use pass_through::PassThroughNode;
pub use sum::SumNode;
