//! HTTP boundary: router, handlers and error mapping.

pub mod error;
pub mod handlers;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use server::{AppState, create_router, run};
