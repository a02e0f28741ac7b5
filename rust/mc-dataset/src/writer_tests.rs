use std::fs;

use crate::{
    cleanup_tmp_files, prune_shards_by_idx, read_meta, read_shard, ShardError, ShardWriter,
    ShardWriterConfig, Windower,
};
use mc_vocab::TokenizedSequence;
use safetensors::SafeTensors;

fn cfg(out: &std::path::Path, per_shard: usize, l: usize) -> ShardWriterConfig {
    ShardWriterConfig {
        out_dir: out.to_path_buf(),
        max_windows_per_shard: per_shard,
        context_length: l,
        stride: l,
        vocab_hash: "abc".to_string(),
        git_hash: None,
        config_hash: Some("cfg".to_string()),
    }
}

fn windows(l: usize) -> Vec<crate::Window> {
    let w = Windower::new(l, l).unwrap();
    let seq = TokenizedSequence::from_ids(vec![2, 10, 11, 12, 13, 3]);
    w.window(&seq)
}

#[test]
fn shard_writer_writes_expected_tensors() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("windows");
    let mut w = ShardWriter::new(cfg(&out, 2, 4)).unwrap();

    let ws = windows(4);
    assert_eq!(ws.len(), 2);
    w.extend(ws.clone()).unwrap(); // triggers flush

    let st_path = out.join("shard_000000.safetensors");
    let meta_path = out.join("shard_000000.meta.json");
    assert!(st_path.exists());
    assert!(meta_path.exists());

    let bytes = fs::read(&st_path).unwrap();
    let st = SafeTensors::deserialize(&bytes).unwrap();
    for name in ["input_ids", "label_ids", "attention_mask", "loss_mask"] {
        assert_eq!(st.tensor(name).unwrap().shape(), &[2, 4], "{name}");
    }

    let meta = read_meta(&meta_path).unwrap();
    assert_eq!(meta.num_windows, 2);
    assert_eq!(meta.context_length, 4);
    assert_eq!(meta.vocab_hash, "abc");
    assert_eq!(meta.config_hash.as_deref(), Some("cfg"));

    assert_eq!(read_shard(&st_path).unwrap(), ws);
}

#[test]
fn finish_flushes_partial_shard() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("windows");
    let mut w = ShardWriter::new(cfg(&out, 8, 4)).unwrap();
    w.extend(windows(4)).unwrap();
    assert!(!out.join("shard_000000.safetensors").exists());
    assert_eq!(w.finish().unwrap(), 1);
    assert_eq!(read_shard(&out.join("shard_000000.safetensors")).unwrap().len(), 2);
}

#[test]
fn shard_writer_resumes_index_in_existing_dir() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("windows");
    fs::create_dir_all(&out).unwrap();

    fs::write(out.join("shard_000000.safetensors"), b"stub").unwrap();
    fs::write(out.join("shard_000000.meta.json"), b"{}").unwrap();

    let mut w = ShardWriter::new(cfg(&out, 1, 4)).unwrap();
    w.push(windows(4).remove(0)).unwrap();

    assert_eq!(fs::read(out.join("shard_000000.safetensors")).unwrap(), b"stub");
    assert!(out.join("shard_000001.safetensors").exists());
    assert!(out.join("shard_000001.meta.json").exists());
}

#[test]
fn wrong_length_window_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut w = ShardWriter::new(cfg(dir.path(), 4, 8)).unwrap();
    let err = w.push(windows(4).remove(0)).unwrap_err();
    assert!(matches!(err, ShardError::InvalidWindow(_)));
}

#[test]
fn zero_shard_size_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    assert!(ShardWriter::new(cfg(dir.path(), 0, 4)).is_err());
}

#[test]
fn prune_keeps_newest_by_idx_and_deletes_pairs() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("windows");
    fs::create_dir_all(&out).unwrap();

    for idx in 0u64..5u64 {
        fs::write(out.join(format!("shard_{idx:06}.safetensors")), b"stub").unwrap();
        fs::write(out.join(format!("shard_{idx:06}.meta.json")), b"{}").unwrap();
    }

    let rep = prune_shards_by_idx(&out, 2).unwrap();
    assert_eq!(rep.before_shards, 5);
    assert_eq!(rep.after_shards, 2);
    assert_eq!(rep.deleted_shards, 3);
    assert_eq!(rep.deleted_min_idx, Some(0));
    assert_eq!(rep.deleted_max_idx, Some(2));

    for idx in 0u64..3u64 {
        assert!(!out.join(format!("shard_{idx:06}.safetensors")).exists());
        assert!(!out.join(format!("shard_{idx:06}.meta.json")).exists());
    }
    for idx in 3u64..5u64 {
        assert!(out.join(format!("shard_{idx:06}.safetensors")).exists());
    }
}

#[test]
fn cleanup_removes_only_tmp_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("shard_000000.safetensors.tmp"), b"x").unwrap();
    fs::write(dir.path().join("shard_000000.meta.json.tmp"), b"x").unwrap();
    fs::write(dir.path().join("shard_000001.safetensors"), b"x").unwrap();
    cleanup_tmp_files(dir.path()).unwrap();
    assert!(!dir.path().join("shard_000000.safetensors.tmp").exists());
    assert!(!dir.path().join("shard_000000.meta.json.tmp").exists());
    assert!(dir.path().join("shard_000001.safetensors").exists());
}
