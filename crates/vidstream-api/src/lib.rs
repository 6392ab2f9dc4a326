//! vidstream API library
//!
//! The HTTP transport over the video pipeline: upload init and fragment
//! endpoints, asset lookup, the server-sent-event progress stream, and process
//! bootstrap.

pub mod constants;
pub mod error;
mod handlers;
pub mod setup;
pub mod state;
pub mod telemetry;

pub use error::{ErrorResponse, HttpAppError};
pub use state::AppState;
