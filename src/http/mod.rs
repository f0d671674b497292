//! HTTP surface: request dispatch, generic/management endpoints, and the
//! router that wires both together.
//!
//! # Modules
//!
//! - `state`: shared [`AppState`](state::AppState) handed to every handler
//! - `dispatch`: per-request parameter binding, execution, and response shaping
//! - `management`: generic config, management mutation, migration and health routes
//! - `router`: assembles the static and per-endpoint axum routes

pub mod dispatch;
pub mod management;
pub mod router;
pub mod state;

pub use router::build_router;
