//! Core application infrastructure

pub mod config;
pub mod constants;
pub mod shutdown;

pub use config::{AppConfig, BackendIdentity, MetadataPaths, PostgresConfig, ServerConfig};
pub use shutdown::ShutdownService;
