pub mod catalog;
pub mod fits;
pub mod preview;

pub use catalog::{Catalog, CatalogColumns, CatalogRow};
pub use fits::{read_fits, read_header, write_fits, FitsHeader, FitsImage};
