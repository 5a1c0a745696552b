pub mod asserts;
pub mod fixtures;
pub mod nodes;

pub use asserts::*;
pub use fixtures::*;
pub use nodes::*;
