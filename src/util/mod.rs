//! Utility modules for meshscope.

mod node;

pub use node::node_name;
