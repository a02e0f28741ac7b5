use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use mc_adapter::{adapter_to_bytes, AdapterDelta, Matrix};
use mc_infer::W_OUTPUT;
use mc_vocab::Vocabulary;
use serde_json::Value;

const DIM: usize = 8;

const CORPUS: &str = "\
1. e4 e5 2. Nf3 Nc6 3. Bb5 a6 1-0
1. d4 d5 2. c4 e6 3. Nc3 Nf6 1/2-1/2
1. e4 c5 2. Nf3 d6 3. d4 cxd4 0-1
1. e4 e5 2. Nf3 Nc6 3. Bc4 Bc5 *
";

fn mc_bin() -> String {
    env!("CARGO_BIN_EXE_mc").to_string()
}

fn run(args: &[&str]) -> Output {
    Command::new(mc_bin())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap()
}

fn run_ok(args: &[&str]) -> String {
    let out = run(args);
    assert!(
        out.status.success(),
        "mc {:?} failed:\nstdout:\n{}\nstderr:\n{}",
        args,
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8(out.stdout).unwrap()
}

fn p(dir: &Path, name: &str) -> String {
    dir.join(name).to_string_lossy().into_owned()
}

/// Corpus, vocabulary, base weights and config in `dir`.
fn setup(dir: &Path) -> String {
    fs::write(dir.join("games.txt"), CORPUS).unwrap();
    run_ok(&[
        "vocab",
        "build",
        "--corpus",
        &p(dir, "games.txt"),
        "--out",
        &p(dir, "vocab.json"),
    ]);
    run_ok(&[
        "init-model",
        "--vocab",
        &p(dir, "vocab.json"),
        "--out",
        &p(dir, "base.safetensors"),
        "--dim",
        &DIM.to_string(),
        "--seed",
        "5",
    ]);
    fs::write(
        dir.join("config.yaml"),
        r#"
vocab:
  path: vocab.json
model:
  base_weights: base.safetensors
  history_window: 4
inference:
  default_num_suggestions: 3
"#,
    )
    .unwrap();
    p(dir, "config.yaml")
}

fn write_boost_adapter(dir: &Path, mv: &str) -> String {
    let v = Vocabulary::load(dir.join("vocab.json")).unwrap();
    let mut b = vec![0.0; v.len()];
    b[v.id_of(mv).unwrap() as usize] = 10.0;
    let delta = AdapterDelta::new(
        W_OUTPUT,
        Matrix::new(1, DIM, vec![1.0; DIM]).unwrap(),
        Matrix::new(v.len(), 1, b).unwrap(),
        1.0,
    )
    .unwrap();
    let path = dir.join("boost.safetensors");
    fs::write(&path, adapter_to_bytes(&[delta]).unwrap()).unwrap();
    path.to_string_lossy().into_owned()
}

// ============================================================
// Smoke
// ============================================================

#[test]
fn version_and_help() {
    let v = run_ok(&["--version"]);
    assert!(v.starts_with("mc "), "{v}");

    let out = run(&["--help"]);
    assert!(out.status.success());
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(err.contains("COMMANDS"), "{err}");
    assert!(err.contains("drift compare"), "{err}");

    let h = run_ok(&["predict", "--help"]);
    assert!(h.contains("--temperature"), "{h}");
}

#[test]
fn unknown_command_and_option_fail() {
    assert!(!run(&["bogus"]).status.success());
    let out = run(&["predict", "--bogus"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("--bogus"));
}

// ============================================================
// Pipeline
// ============================================================

#[test]
fn predict_returns_legal_candidates() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = setup(dir.path());

    let out = run_ok(&["predict", "--config", &cfg, "--moves", "1. e4 e5 2. Nf3"]);
    let v: Value = serde_json::from_str(&out).unwrap();
    let cands = v["candidates"].as_array().unwrap();
    assert_eq!(cands.len(), 3);
    let sum: f64 = cands.iter().map(|c| c["probability"].as_f64().unwrap()).sum();
    assert!((sum - 1.0).abs() < 1e-6, "sum={sum}");
    assert_eq!(v["terminal"], Value::Bool(false));
    // Black to move after 1. e4 e5 2. Nf3: no white pawn pushes.
    for c in cands {
        let mv = c["move"].as_str().unwrap();
        assert_ne!(mv, "d4");
        assert_ne!(mv, "e4");
    }

    let out = run_ok(&["predict", "--config", &cfg, "--moves", "", "--n", "1"]);
    let v: Value = serde_json::from_str(&out).unwrap();
    assert_eq!(v["candidates"].as_array().unwrap().len(), 1);
}

#[test]
fn predict_rejects_illegal_history_and_bad_temperature() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = setup(dir.path());

    let out = run(&["predict", "--config", &cfg, "--moves", "e4 e4"]);
    assert!(!out.status.success());
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(err.contains("moves"), "{err}");

    let out = run(&["predict", "--config", &cfg, "--temperature", "0"]);
    assert!(!out.status.success());
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(err.contains("temperature"), "{err}");
}

#[test]
fn window_writes_shards_and_accumulates_manifest() {
    let dir = tempfile::tempdir().unwrap();
    setup(dir.path());
    let shards = dir.path().join("shards");
    let events = p(dir.path(), "events.ndjson");

    let vocab = p(dir.path(), "vocab.json");
    let corpus = p(dir.path(), "games.txt");
    let out_dir = shards.to_string_lossy().into_owned();
    let args = [
        "window",
        "--vocab",
        vocab.as_str(),
        "--corpus",
        corpus.as_str(),
        "--out",
        out_dir.as_str(),
        "--context-length",
        "6",
        "--stride",
        "3",
        "--shard-size",
        "4",
        "--events",
        events.as_str(),
    ];
    let out = run_ok(&args);
    assert!(out.contains("Windowing:"), "{out}");

    let m1: Value = serde_json::from_slice(&fs::read(shards.join("run.json")).unwrap()).unwrap();
    assert_eq!(m1["games"], 4);
    assert_eq!(m1["context_length"], 6);
    let windows = m1["windows"].as_u64().unwrap();
    assert!(windows >= 4, "windows={windows}");
    assert!(fs::read_dir(&shards)
        .unwrap()
        .filter_map(Result::ok)
        .any(|e| e.file_name().to_string_lossy().ends_with(".safetensors")));

    run_ok(&args);
    let m2: Value = serde_json::from_slice(&fs::read(shards.join("run.json")).unwrap()).unwrap();
    assert_eq!(m2["games"], 8);
    assert_eq!(m2["windows"].as_u64().unwrap(), 2 * windows);
    assert_eq!(m2["run_id"], m1["run_id"]);

    let lines = fs::read_to_string(&events).unwrap();
    assert_eq!(lines.lines().count(), 2);
    let ev: Value = serde_json::from_str(lines.lines().next().unwrap()).unwrap();
    assert_eq!(ev["event"], "windowing_stats");
}

#[test]
fn drift_baseline_then_compare_same_corpus_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    setup(dir.path());
    let vocab = p(dir.path(), "vocab.json");
    let corpus = p(dir.path(), "games.txt");
    let baseline = p(dir.path(), "baseline.json");

    run_ok(&[
        "drift", "baseline", "--vocab", &vocab, "--corpus", &corpus, "--out", &baseline,
    ]);
    let out = run_ok(&[
        "drift",
        "compare",
        "--vocab",
        &vocab,
        "--corpus",
        &corpus,
        "--baseline",
        &baseline,
    ]);
    let report: Value = serde_json::from_str(&out).unwrap();
    assert_eq!(report["status"], "stable");
    assert_eq!(report["sample_sequences"], 4);

    // Moves the vocabulary has never seen.
    fs::write(dir.path().join("odd.txt"), "1. a4 h5 2. Ra3 Rh6\n1. h4 a5 2. Rh3 Ra6\n").unwrap();
    let out = run_ok(&[
        "drift",
        "compare",
        "--vocab",
        &vocab,
        "--corpus",
        &p(dir.path(), "odd.txt"),
        "--baseline",
        &baseline,
    ]);
    let report: Value = serde_json::from_str(&out).unwrap();
    assert_eq!(report["status"], "drifted");
    let flagged: Vec<&str> = report["metrics"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|m| m["flagged"] == Value::Bool(true))
        .map(|m| m["name"].as_str().unwrap())
        .collect();
    assert!(flagged.contains(&"unk_rate"), "{flagged:?}");
}

#[test]
fn drift_compare_refuses_a_baseline_from_another_vocabulary() {
    let dir = tempfile::tempdir().unwrap();
    setup(dir.path());
    let corpus = p(dir.path(), "games.txt");
    let baseline = p(dir.path(), "baseline.json");
    run_ok(&[
        "drift",
        "baseline",
        "--vocab",
        &p(dir.path(), "vocab.json"),
        "--corpus",
        &corpus,
        "--out",
        &baseline,
    ]);

    fs::write(dir.path().join("other.txt"), "1. c4 e5 2. Nc3 Nf6\n1. Nf3 d5 2. g3 c6\n").unwrap();
    let other_vocab = p(dir.path(), "other_vocab.json");
    run_ok(&[
        "vocab",
        "build",
        "--corpus",
        &p(dir.path(), "other.txt"),
        "--out",
        &other_vocab,
    ]);

    let out = run(&[
        "drift",
        "compare",
        "--vocab",
        &other_vocab,
        "--corpus",
        &corpus,
        "--baseline",
        &baseline,
    ]);
    assert!(!out.status.success());
    assert!(out.stdout.is_empty());
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(err.contains("vocabulary"), "{err}");
}

#[test]
fn rollout_and_eval_report_json() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = setup(dir.path());

    let out = run_ok(&[
        "rollout", "--config", &cfg, "--moves", "e4", "--plies", "6", "--seed", "3", "--no-eos",
    ]);
    let r: Value = serde_json::from_str(&out).unwrap();
    assert_eq!(r["moves"].as_array().unwrap().len(), 6);
    assert_eq!(r["end"], "ply_limit");

    let out = run_ok(&["eval", "--config", &cfg, "--corpus", &p(dir.path(), "games.txt")]);
    let r: Value = serde_json::from_str(&out).unwrap();
    assert_eq!(r["games"], 4);
    assert!(r["positions"].as_u64().unwrap() > 0);
    let acc = r["accuracy"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&acc));
}

#[test]
fn adapters_merge_writes_weights_usable_as_base() {
    let dir = tempfile::tempdir().unwrap();
    setup(dir.path());
    let adapter = write_boost_adapter(dir.path(), "d4");

    let out = run_ok(&[
        "adapters",
        "merge",
        "--base",
        &p(dir.path(), "base.safetensors"),
        "--adapter",
        &adapter,
        "--out",
        &p(dir.path(), "merged.safetensors"),
    ]);
    assert!(out.contains("Merged 1 deltas"), "{out}");

    fs::write(
        dir.path().join("merged.yaml"),
        "vocab:\n  path: vocab.json\nmodel:\n  base_weights: merged.safetensors\n  history_window: 4\n",
    )
    .unwrap();
    let predict = |cfg: &str| -> Value {
        let out = run_ok(&["predict", "--config", cfg, "--moves", "", "--n", "20"]);
        serde_json::from_str(&out).unwrap()
    };
    let base = predict(&p(dir.path(), "config.yaml"));
    let merged = predict(&p(dir.path(), "merged.yaml"));
    let prob_of = |v: &Value, mv: &str| -> f64 {
        v["candidates"]
            .as_array()
            .unwrap()
            .iter()
            .find(|c| c["move"] == mv)
            .map(|c| c["probability"].as_f64().unwrap())
            .unwrap()
    };
    assert_ne!(prob_of(&base, "d4"), prob_of(&merged, "d4"));
}
