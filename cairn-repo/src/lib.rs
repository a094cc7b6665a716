pub mod error;
pub mod path;
pub mod property;
pub mod resource;

// contract and reference implementation
pub mod memory;
pub mod repository;

pub use error::{Error, Result};
pub use path::Path;
pub use repository::{ArcRepository, Repository};
