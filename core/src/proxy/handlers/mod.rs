// Handlers module
pub mod http;
pub mod response;
pub mod websocket;
