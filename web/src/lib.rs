//! Shared axum plumbing for the wallet ledger services.
//!
//! Both services expose a thin HTTP shell over their use cases. Handlers
//! decode JSON, call the use case and map failures onto [`AppError`], which
//! renders a `{ "code", "message" }` body:
//!
//! ```text
//! ┌─────────────────────────────────┐
//! │        HTTP shell (axum)        │  ← JSON in, JSON out
//! ├─────────────────────────────────┤
//! │           Use cases             │  ← unit of work, dispatch
//! └─────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use ledger_web::{AppError, health_check};
//! use axum::{Router, routing::{get, post}};
//!
//! let app = Router::new()
//!     .route("/health", get(health_check))
//!     .route("/transactions", post(create_transfer))
//!     .with_state(state);
//! ```

pub mod error;
pub mod health;

pub use error::AppError;
pub use health::{HealthResponse, health_check};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
