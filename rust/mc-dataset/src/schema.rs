//! Window shard tensor schema.

/// Shard format version (bump when tensor names or dtypes change).
pub const SHARD_FORMAT_VERSION: u32 = 1;

/// Tensor names inside safetensors. All are `[num_windows, context_length]`.
pub const T_INPUT_IDS: &str = "input_ids";
pub const T_LABEL_IDS: &str = "label_ids";
pub const T_ATTENTION_MASK: &str = "attention_mask";
pub const T_LOSS_MASK: &str = "loss_mask";
