//! Web layer.
//!
//! Serves the records each provider last published as JSON, for an
//! external display to render.

mod dto;
mod routes;
mod state;

pub use dto::*;
pub use routes::create_router;
pub use state::AppState;
