//! Dashboard HTTP API: wire DTOs plus the axum router that exposes them
//! over `Engine`.

pub mod dto;
pub mod routes;

pub use routes::router;
