//! mc-adapter: base weight views, LoRA deltas and the hot-swappable adapter catalog.

pub mod error;
pub mod lora;
pub mod matrix;
pub mod registry;
pub mod weights;

pub use error::AdapterError;
pub use lora::{
    adapter_to_bytes, apply_adapters, load_adapter, load_adapter_from, validate_adapters,
    AdapterDelta,
};
pub use matrix::Matrix;
pub use registry::{AdapterCatalog, AdapterRegistry};
pub use weights::{
    load_base, load_base_file, load_base_from, save_weights, weights_to_bytes, WeightView,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");


#[cfg(test)]
mod adapter_tests;
