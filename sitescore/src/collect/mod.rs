pub mod geotiff;
pub mod global_variables;
pub mod provider;
pub mod session;
