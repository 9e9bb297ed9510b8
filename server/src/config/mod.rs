//! Guest configuration: typed schema, validation, and version normalization

pub mod schema;
pub mod validate;
pub mod versions;
