pub mod format;
pub mod models;
