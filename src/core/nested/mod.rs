mod nested;
mod path;

pub use nested::Nested;
pub use path::{NestedPath, PathSegment};
