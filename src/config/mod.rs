// config/mod.rs
mod types;

pub use types::{ClusterConfig, DEFAULT_API_PORT};
