pub mod error;
pub mod fs;
pub mod json;
pub mod run_id;

pub use error::*;
pub use fs::*;
pub use json::*;
pub use run_id::*;
