//! mc-oracle: legal-move enumeration from SAN move histories.
//!
//! Chess rules come from `cozy-chess`; this crate adds SAN formatting and
//! parsing and exposes the [`LegalMoveOracle`] seam used by inference.

pub mod board;
pub mod san;

pub use board::{BoardState, LegalMoveOracle, OracleError, Position, StandardChess, TerminalKind};
pub use san::{color_name, normalize_san};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
