// Mappers module
pub mod intermediate;
pub mod models;
pub mod optional_params;
pub mod payload;

pub use models::{ChatMessage, Role, UiRequest};
pub use optional_params::{parse_optional_params, OptionalParameters};
