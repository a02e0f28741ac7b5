//! mc-dataset: causal training windows and their safetensors shards.

pub mod schema;
pub mod window;
pub mod writer;

pub use window::{Window, WindowError, WindowStats, Windower};
pub use writer::{
    cleanup_tmp_files, list_shard_indices, prune_shards_by_idx, read_meta, read_shard,
    PruneReport, ShardError, ShardMeta, ShardWriter, ShardWriterConfig,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}

#[cfg(test)]
mod writer_tests;
