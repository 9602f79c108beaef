pub mod device;
pub mod schema;
