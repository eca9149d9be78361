//! gangway-server: the deployment daemon.
//!
//! `gangwayd` exposes four routes (`/health`, `/check`, `/deploy`,
//! `/rollback`) behind bearer-token auth and per-address sliding-window
//! rate limiting. Deployments and rollbacks are serialized by a single
//! process-wide lock and stream a plain-text log back to the client; the
//! literal sentinel line at the end of the stream, not the HTTP status, is
//! the success indicator.

pub mod auth;
pub mod deploy;
pub mod error;
pub mod exec;
pub mod handlers;
pub mod inventory;
pub mod ratelimit;
pub mod routes;
pub mod state;
pub mod stream;

pub use routes::create_router;
pub use state::AppState;
