pub mod config;
pub mod handlers;
pub mod observability;
pub mod server;

pub use config::{AdminUserConfig, AppConfig, BootstrapConfig, LoggingConfig, ServerConfig};
pub use observability::init_tracing;
pub use server::{AppState, CaltrackServer, ServerBuilder, build_app};
