pub mod build;
mod nodes;
mod types;

pub use nodes::*;
pub use types::TypeName;
