pub mod quad_tree;

pub use quad_tree::{PlayerPoint, QuadTree, Rect};
