//! Read-only HTTP surface over the mirror
//!
//! - `GET /projects/{owner}`: one project record
//! - `GET /projects/approved`: approved, non-revoked projects
//! - `GET /health`: supervisor state, last synced position, counters
//!
//! Reads never wait on the ledger; a lagging mirror shows up in `/health`.

mod error;
pub mod models;
mod server;
pub mod services;
pub mod state;

pub use error::ApiError;
pub use server::{bind, router, serve};
pub use state::AppState;
