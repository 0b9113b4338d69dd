// Library exports for murmur-server
// The seed CLI and the integration tests build on these modules

pub mod api;
pub mod config;
pub mod db;
pub mod seed;
pub mod state;
