pub mod config;
pub mod search;

pub use config::{DetectionConfig, SearchConfig};
pub use search::{coordinate_catalog_path, find_objects, ObjectSearch, SearchStatus};
