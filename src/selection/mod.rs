mod tree;

pub use tree::{CheckState, SelectionTree};
