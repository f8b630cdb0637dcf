//! Relay module - allow-listed reverse proxy in front of the agent backend

pub mod endpoint;
pub mod error;
pub mod handlers;
pub mod mappers;
pub mod security;
pub mod server;
pub mod session_manager;
pub mod sse;
pub mod upstream;

pub use endpoint::{Endpoint, RouteTable};
pub use error::ProxyError;
pub use security::{validate_backend_url, validate_proxy_http_path, validate_proxy_websocket_path, ValidationResult};
pub use server::{build_router, AppState, ProxyServer};
pub use session_manager::{RagInitializer, RagSessionCache};
