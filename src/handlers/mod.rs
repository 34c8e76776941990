//! API handlers.
//!
//! Each handler takes the shared [`crate::AppState`] plus already-extracted
//! request inputs and returns `Result<Response, ApiError>`; HTTP extraction
//! lives in [`crate::server`].

pub mod app;
pub mod auth;
pub mod files;
pub mod users;
