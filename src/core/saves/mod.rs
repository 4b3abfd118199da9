pub mod model;
pub mod tree;

pub use model::{LayoutMode, LocalWorldEntry, INSTANCE_SAVES_DIR};
pub use tree::SaveTree;
