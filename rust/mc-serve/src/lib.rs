//! mc-serve: HTTP boundary for next-move prediction.
//!
//! `POST /predict/next-move` takes `{moves, num_suggestions?, temperature?, adapters?}`
//! and returns ranked legal suggestions; `GET /health` and `GET /metrics` report
//! engine state. Input errors are 400 with the offending field named; scoring
//! and configuration failures are 500.

pub mod handler;
pub mod protocol;
pub mod server;

pub use handler::{handle, AppState, HttpReply};
pub use protocol::{
    ErrorResponseV1, FieldError, HealthResponseV1, PredictRequestV1, PredictResponseV1, SuggestionV1,
    PROTOCOL_VERSION,
};
pub use server::{serve, start, ServeError, ServerHandle};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
