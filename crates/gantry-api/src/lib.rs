//! Gantry HTTP server.
//!
//! Webhook ingress, the job query surface and operator actions.

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use state::AppState;
