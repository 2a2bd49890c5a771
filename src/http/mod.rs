//! HTTP API subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, timeout, body limit, trace)
//!     → handlers.rs (decode camelCase bodies, load WIF keys)
//!     → TokenOrchestrator
//!     → response.rs (envelope, error → status mapping)
//! ```

pub mod admin;
pub mod handlers;
pub mod response;
pub mod server;

pub use response::{ApiError, ApiResponse};
pub use server::{AppState, HttpServer, X_REQUEST_ID};
