mod loader;
mod plan;
mod types;

pub use loader::{load_config, load_plan};
pub use plan::*;
pub use types::*;
