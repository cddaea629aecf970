pub mod index;
pub mod model;

pub use index::{Resolved, TreeIndex};
pub use model::*;
