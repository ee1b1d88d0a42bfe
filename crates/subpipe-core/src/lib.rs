pub mod align;
pub mod clean;
pub mod consts;
pub mod detection;
pub mod diff;
pub mod error;
pub mod header;
pub mod io;
pub mod pipeline;
pub mod record;
pub mod seeing;
pub mod stats;
pub mod template;
pub mod tools;
