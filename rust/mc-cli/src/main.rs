//! mc: command line for movecast.
//!
//! Subcommands:
//! - vocab build
//! - window
//! - init-model
//! - predict
//! - rollout
//! - eval
//! - serve
//! - drift baseline / drift compare
//! - adapters merge

use std::collections::HashMap;
use std::env;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;
use std::sync::Arc;

use mc_adapter::{apply_adapters, load_adapter, load_base_file, save_weights, AdapterDelta};
use mc_core::{resolve_path, Config};
use mc_dataset::{
    cleanup_tmp_files, list_shard_indices, prune_shards_by_idx, ShardWriter, ShardWriterConfig,
    Windower,
};
use mc_drift::{compare_stats, DriftBaseline, DriftThresholds, SequenceStats};
use mc_infer::{init_bilinear, InferenceEngine, PredictError, RolloutOptions};
use mc_logging::{
    hash_bytes, init_tracing, now_ms, read_manifest, try_git_hash, write_manifest_atomic,
    DriftReportEventV1, NdjsonWriter, RunManifestV1, WindowingStatsEventV1, DEFAULT_LOG_DIRECTIVE,
    RUN_MANIFEST_VERSION,
};
use mc_serve::AppState;
use mc_vocab::{parse_game_line, read_corpus, BuildOptions, TokenizedSequence, Vocabulary};
use tracing::{info, warn};

fn die(msg: impl Display) -> ! {
    eprintln!("{msg}");
    process::exit(1);
}

trait OrDie<T> {
    fn or_die(self, ctx: &str) -> T;
}

impl<T, E: Display> OrDie<T> for Result<T, E> {
    fn or_die(self, ctx: &str) -> T {
        self.unwrap_or_else(|e| die(format!("{ctx}: {e}")))
    }
}

fn next_value(args: &[String], i: &mut usize, flag: &str) -> String {
    if *i + 1 >= args.len() {
        die(format!("Missing value for {flag}"));
    }
    let v = args[*i + 1].clone();
    *i += 2;
    v
}

fn next_parsed<T: FromStr>(args: &[String], i: &mut usize, flag: &str) -> T {
    let v = next_value(args, i, flag);
    v.parse()
        .unwrap_or_else(|_| die(format!("Invalid {flag} value: {v}")))
}

fn unknown_option(cmd: &str, other: &str) -> ! {
    eprintln!("Unknown option for `mc {cmd}`: {other}");
    eprintln!("Run `mc {cmd} --help` for usage.");
    process::exit(1);
}

fn required(v: Option<String>, flag: &str, cmd: &str) -> String {
    v.unwrap_or_else(|| {
        eprintln!("Missing required {flag} for `mc {cmd}`");
        eprintln!("Run `mc {cmd} --help` for usage.");
        process::exit(1);
    })
}

/// Parse a move list such as `"1. e4 e5 2. Nf3"`.
fn parse_moves(s: &str) -> Vec<String> {
    parse_game_line(s, 1)
        .or_die("invalid --moves")
        .unwrap_or_default()
}

fn load_config(path: &str) -> (Config, PathBuf) {
    let cfg = Config::load(path).or_die(&format!("failed to load config {path}"));
    let dir = Path::new(path)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    (cfg, dir)
}

fn load_engine(path: &str) -> (InferenceEngine, Config, PathBuf) {
    let (cfg, dir) = load_config(path);
    let engine = InferenceEngine::from_config(&cfg, &dir).or_die("failed to load engine");
    (engine, cfg, dir)
}

fn encode_corpus(vocab: &Vocabulary, path: &str) -> (usize, Vec<TokenizedSequence>) {
    let games = read_corpus(path).or_die(&format!("failed to read corpus {path}"));
    let seqs = games.iter().map(|g| vocab.encode(g.as_slice())).collect();
    (games.len(), seqs)
}

fn print_json<T: serde::Serialize>(v: &T) {
    match serde_json::to_string_pretty(v) {
        Ok(s) => println!("{s}"),
        Err(e) => die(format!("failed to serialize output: {e}")),
    }
}

fn exit_on_predict_error(e: PredictError) -> ! {
    match e {
        PredictError::Input { field, reason } => die(format!("invalid {field}: {reason}")),
        other => die(format!("prediction failed: {other}")),
    }
}

// ============================================================
// vocab / window / init-model
// ============================================================

fn cmd_vocab_build(args: &[String]) {
    let mut corpus: Option<String> = None;
    let mut out: Option<String> = None;
    let mut opts = BuildOptions::default();

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!(
                    r#"mc vocab build

USAGE:
    mc vocab build --corpus FILE --out FILE [--min-count N] [--max-size N]

OPTIONS:
    --corpus FILE    One game per line, SAN moves separated by whitespace
    --out FILE       Vocabulary JSON to write
    --min-count N    Drop moves seen fewer than N times (default: 1)
    --max-size N     Keep at most N move entries
"#
                );
                return;
            }
            "--corpus" => corpus = Some(next_value(args, &mut i, "--corpus")),
            "--out" => out = Some(next_value(args, &mut i, "--out")),
            "--min-count" => opts.min_count = next_parsed(args, &mut i, "--min-count"),
            "--max-size" => opts.max_size = Some(next_parsed(args, &mut i, "--max-size")),
            other => unknown_option("vocab build", other),
        }
    }
    let corpus = required(corpus, "--corpus", "vocab build");
    let out = required(out, "--out", "vocab build");

    let games = read_corpus(&corpus).or_die(&format!("failed to read corpus {corpus}"));
    let vocab = Vocabulary::build(&games, &opts);
    vocab.save(&out).or_die(&format!("failed to write {out}"));
    info!(games = games.len(), size = vocab.len(), "vocabulary built");
    println!("Vocabulary:");
    println!("  - Games: {}", games.len());
    println!("  - Entries: {} ({} moves)", vocab.len(), vocab.moves().count());
    println!("  - Corpus hash: {}", vocab.corpus_hash());
    println!("  - Written: {out}");
}

fn cmd_window(args: &[String]) {
    let mut vocab_path: Option<String> = None;
    let mut corpus: Option<String> = None;
    let mut out: Option<String> = None;
    let mut config_path: Option<String> = None;
    let mut context_length: Option<usize> = None;
    let mut stride: Option<usize> = None;
    let mut shard_size: Option<usize> = None;
    let mut keep_shards: Option<usize> = None;
    let mut events: Option<String> = None;

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!(
                    r#"mc window

USAGE:
    mc window --vocab FILE --corpus FILE --out DIR [OPTIONS]

OPTIONS:
    --config FILE          Take dataset defaults from this config
    --context-length L     Tokens per window (default: 128)
    --stride S             Offset between window starts (default: 64)
    --shard-size N         Windows per shard (default: 4096)
    --keep-shards N        Delete the oldest shards beyond N after writing
    --events FILE          Append a windowing_stats NDJSON event
"#
                );
                return;
            }
            "--vocab" => vocab_path = Some(next_value(args, &mut i, "--vocab")),
            "--corpus" => corpus = Some(next_value(args, &mut i, "--corpus")),
            "--out" => out = Some(next_value(args, &mut i, "--out")),
            "--config" => config_path = Some(next_value(args, &mut i, "--config")),
            "--context-length" => {
                context_length = Some(next_parsed(args, &mut i, "--context-length"))
            }
            "--stride" => stride = Some(next_parsed(args, &mut i, "--stride")),
            "--shard-size" => shard_size = Some(next_parsed(args, &mut i, "--shard-size")),
            "--keep-shards" => keep_shards = Some(next_parsed(args, &mut i, "--keep-shards")),
            "--events" => events = Some(next_value(args, &mut i, "--events")),
            other => unknown_option("window", other),
        }
    }
    let vocab_path = required(vocab_path, "--vocab", "window");
    let corpus = required(corpus, "--corpus", "window");
    let out = PathBuf::from(required(out, "--out", "window"));

    let (dataset, config_hash) = match &config_path {
        Some(p) => {
            let (cfg, _) = load_config(p);
            let bytes = fs::read(p).or_die(&format!("failed to read {p}"));
            (cfg.dataset, Some(hash_bytes(&bytes)))
        }
        None => (Config::default().dataset, None),
    };
    let context_length = context_length.unwrap_or(dataset.context_length);
    let stride = stride.unwrap_or(dataset.stride);
    let shard_size = shard_size.unwrap_or(dataset.max_windows_per_shard);

    let vocab = Vocabulary::load(&vocab_path).or_die("failed to load vocabulary");
    let windower = Windower::new(context_length, stride).or_die("invalid windowing parameters");
    let (games, seqs) = encode_corpus(&vocab, &corpus);
    let unk: u64 = seqs.iter().map(|s| s.unk_substitutions() as u64).sum();
    if unk > 0 {
        warn!(unk_substitutions = unk, "corpus contains moves outside the vocabulary");
    }

    cleanup_tmp_files(&out).or_die("failed to clean shard directory");
    let (windows, stats) = windower.window_all(&seqs);
    let git_hash = try_git_hash();
    let mut writer = ShardWriter::new(ShardWriterConfig {
        out_dir: out.clone(),
        max_windows_per_shard: shard_size,
        context_length,
        stride,
        vocab_hash: vocab.corpus_hash().to_string(),
        git_hash: git_hash.clone(),
        config_hash: config_hash.clone(),
    })
    .or_die("failed to open shard writer");
    writer.extend(windows).or_die("failed to write shards");
    let shards = writer.finish().or_die("failed to write shards");

    // Counters accumulate across runs into the same directory.
    let manifest_path = out.join("run.json");
    let prev = read_manifest(&manifest_path).ok();
    let ts = now_ms();
    let manifest = RunManifestV1 {
        run_manifest_version: RUN_MANIFEST_VERSION,
        run_id: prev
            .as_ref()
            .map(|m| m.run_id.clone())
            .unwrap_or_else(|| format!("window-{ts}")),
        created_ts_ms: prev.as_ref().map(|m| m.created_ts_ms).unwrap_or(ts),
        vocab_hash: vocab.corpus_hash().to_string(),
        config_hash,
        git_hash,
        vocab_size: vocab.len(),
        context_length,
        stride,
        games: prev.as_ref().map_or(0, |m| m.games) + games as u64,
        windows: prev.as_ref().map_or(0, |m| m.windows) + stats.windows,
        shards: prev.as_ref().map_or(0, |m| m.shards) + shards,
        unk_substitutions: prev.as_ref().map_or(0, |m| m.unk_substitutions) + unk,
        pad_tokens: prev.as_ref().map_or(0, |m| m.pad_tokens) + stats.pad_tokens,
    };
    write_manifest_atomic(&manifest_path, &manifest).or_die("failed to write run manifest");

    if let Some(keep) = keep_shards {
        let r = prune_shards_by_idx(&out, keep).or_die("failed to prune shards");
        info!(deleted = r.deleted_shards, kept = r.after_shards, "pruned shards");
    }

    if let Some(path) = events {
        let mut w = NdjsonWriter::open_append(&path).or_die("failed to open events file");
        w.write_event(&WindowingStatsEventV1 {
            event: "windowing_stats",
            ts_ms: ts,
            games: games as u64,
            windows: stats.windows,
            loss_tokens: stats.loss_tokens,
            pad_tokens: stats.pad_tokens,
            unk_substitutions: unk,
        })
        .or_die("failed to write event");
        w.flush().or_die("failed to flush events");
    }

    let on_disk = list_shard_indices(&out).or_die("failed to list shards").len();
    println!("Windowing:");
    println!("  - Games: {games}");
    println!("  - Windows: {} ({} loss tokens, {} pad tokens)", stats.windows, stats.loss_tokens, stats.pad_tokens);
    println!("  - UNK substitutions: {unk}");
    println!("  - Shards written: {shards} ({on_disk} in {})", out.display());
}

fn cmd_init_model(args: &[String]) {
    let mut vocab_path: Option<String> = None;
    let mut out: Option<String> = None;
    let mut dim: usize = 32;
    let mut seed: u64 = 0;

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!(
                    r#"mc init-model

USAGE:
    mc init-model --vocab FILE --out FILE [--dim D] [--seed S]

OPTIONS:
    --vocab FILE   Vocabulary the weights are sized for
    --out FILE     Base weights (safetensors) to write
    --dim D        Hidden size (default: 32)
    --seed S       RNG seed (default: 0)
"#
                );
                return;
            }
            "--vocab" => vocab_path = Some(next_value(args, &mut i, "--vocab")),
            "--out" => out = Some(next_value(args, &mut i, "--out")),
            "--dim" => dim = next_parsed(args, &mut i, "--dim"),
            "--seed" => seed = next_parsed(args, &mut i, "--seed"),
            other => unknown_option("init-model", other),
        }
    }
    let vocab_path = required(vocab_path, "--vocab", "init-model");
    let out = required(out, "--out", "init-model");
    if dim == 0 {
        die("--dim must be >= 1");
    }

    let vocab = Vocabulary::load(&vocab_path).or_die("failed to load vocabulary");
    let weights = init_bilinear(vocab.len(), dim, seed);
    let meta = HashMap::from([
        ("vocab_hash".to_string(), vocab.corpus_hash().to_string()),
        ("dim".to_string(), dim.to_string()),
        ("seed".to_string(), seed.to_string()),
    ]);
    save_weights(&weights, Some(meta), &out).or_die(&format!("failed to write {out}"));
    println!("Wrote base weights for {} tokens (dim {dim}) to {out}", vocab.len());
}

// ============================================================
// predict / rollout / eval / serve
// ============================================================

fn cmd_predict(args: &[String]) {
    let mut config_path: Option<String> = None;
    let mut moves = String::new();
    let mut n: Option<usize> = None;
    let mut temperature: Option<f32> = None;
    let mut adapters: Vec<String> = Vec::new();

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!(
                    r#"mc predict

USAGE:
    mc predict --config FILE --moves "e4 e5 Nf3" [OPTIONS]

OPTIONS:
    --n N              Suggestions to return (default: inference.default_num_suggestions)
    --temperature T    Softmax temperature (default: inference.default_temperature)
    --adapter NAME     Apply a preloaded adapter; repeat to compose in order
"#
                );
                return;
            }
            "--config" => config_path = Some(next_value(args, &mut i, "--config")),
            "--moves" => moves = next_value(args, &mut i, "--moves"),
            "--n" => n = Some(next_parsed(args, &mut i, "--n")),
            "--temperature" => temperature = Some(next_parsed(args, &mut i, "--temperature")),
            "--adapter" => adapters.push(next_value(args, &mut i, "--adapter")),
            other => unknown_option("predict", other),
        }
    }
    let config_path = required(config_path, "--config", "predict");
    let (engine, _, _) = load_engine(&config_path);

    let mut opts = engine.default_options().with_adapters(adapters);
    if let Some(n) = n {
        opts.num_suggestions = n;
    }
    if let Some(t) = temperature {
        opts.temperature = t;
    }
    let history = parse_moves(&moves);
    match engine.predict_next(&history, &opts) {
        Ok(p) => print_json(&p),
        Err(e) => exit_on_predict_error(e),
    }
}

fn cmd_rollout(args: &[String]) {
    let mut config_path: Option<String> = None;
    let mut moves = String::new();
    let mut opts = RolloutOptions::default();

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!(
                    r#"mc rollout

USAGE:
    mc rollout --config FILE --moves "e4 e5" [OPTIONS]

OPTIONS:
    --plies N          Moves to append at most (default: 40)
    --seed S           RNG seed (default: 0)
    --temperature T    Softmax temperature (default: 1.0)
    --adapter NAME     Apply a preloaded adapter; repeat to compose in order
    --no-eos           Never stop on a sampled end-of-game token
"#
                );
                return;
            }
            "--config" => config_path = Some(next_value(args, &mut i, "--config")),
            "--moves" => moves = next_value(args, &mut i, "--moves"),
            "--plies" => opts.plies = next_parsed(args, &mut i, "--plies"),
            "--seed" => opts.seed = next_parsed(args, &mut i, "--seed"),
            "--temperature" => opts.temperature = next_parsed(args, &mut i, "--temperature"),
            "--adapter" => opts.adapters.push(next_value(args, &mut i, "--adapter")),
            "--no-eos" => {
                opts.allow_end_of_game = false;
                i += 1;
            }
            other => unknown_option("rollout", other),
        }
    }
    let config_path = required(config_path, "--config", "rollout");
    let (engine, _, _) = load_engine(&config_path);
    let history = parse_moves(&moves);
    match engine.rollout(&history, &opts) {
        Ok(r) => print_json(&r),
        Err(e) => exit_on_predict_error(e),
    }
}

fn cmd_eval(args: &[String]) {
    let mut config_path: Option<String> = None;
    let mut corpus: Option<String> = None;
    let mut adapters: Vec<String> = Vec::new();

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!(
                    r#"mc eval

USAGE:
    mc eval --config FILE --corpus FILE [--adapter NAME]...

Reports top-1 legal-move accuracy and token perplexity over the corpus.
"#
                );
                return;
            }
            "--config" => config_path = Some(next_value(args, &mut i, "--config")),
            "--corpus" => corpus = Some(next_value(args, &mut i, "--corpus")),
            "--adapter" => adapters.push(next_value(args, &mut i, "--adapter")),
            other => unknown_option("eval", other),
        }
    }
    let config_path = required(config_path, "--config", "eval");
    let corpus = required(corpus, "--corpus", "eval");
    let (engine, _, _) = load_engine(&config_path);
    let games = read_corpus(&corpus).or_die(&format!("failed to read corpus {corpus}"));
    match engine.evaluate(&games, &adapters) {
        Ok(r) => print_json(&r),
        Err(e) => exit_on_predict_error(e),
    }
}

fn cmd_serve(args: &[String]) {
    let mut config_path: Option<String> = None;
    let mut bind: Option<String> = None;
    let mut workers: Option<usize> = None;

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!(
                    r#"mc serve

USAGE:
    mc serve --config FILE [--bind ADDR] [--workers N]

ENDPOINTS:
    POST /predict/next-move   {{"moves": [...], "num_suggestions"?, "temperature"?, "adapters"?}}
    GET  /health
    GET  /metrics
"#
                );
                return;
            }
            "--config" => config_path = Some(next_value(args, &mut i, "--config")),
            "--bind" => bind = Some(next_value(args, &mut i, "--bind")),
            "--workers" => workers = Some(next_parsed(args, &mut i, "--workers")),
            other => unknown_option("serve", other),
        }
    }
    let config_path = required(config_path, "--config", "serve");
    let (engine, cfg, dir) = load_engine(&config_path);

    let mut state = AppState::new(Arc::new(engine));
    if let Some(p) = &cfg.logging.events_path {
        let path = resolve_path(&dir, p);
        let w = NdjsonWriter::open_append_with_flush(&path, cfg.logging.flush_every_lines)
            .or_die(&format!("failed to open events file {}", path.display()));
        state = state.with_events(w);
    }
    let bind = bind.unwrap_or(cfg.serve.bind);
    let workers = workers.unwrap_or(cfg.serve.workers);
    println!("Listening on http://{bind} ({workers} workers)");
    mc_serve::serve(Arc::new(state), &bind, workers).or_die("server failed");
}

// ============================================================
// drift
// ============================================================

fn cmd_drift_baseline(args: &[String]) {
    let mut vocab_path: Option<String> = None;
    let mut corpus: Option<String> = None;
    let mut out: Option<String> = None;
    let mut illegal_rate: Option<f64> = None;

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!(
                    r#"mc drift baseline

USAGE:
    mc drift baseline --vocab FILE --corpus FILE --out FILE [--illegal-rate R]

Rebuilds the reference statistics. Baselines change only through this command.
"#
                );
                return;
            }
            "--vocab" => vocab_path = Some(next_value(args, &mut i, "--vocab")),
            "--corpus" => corpus = Some(next_value(args, &mut i, "--corpus")),
            "--out" => out = Some(next_value(args, &mut i, "--out")),
            "--illegal-rate" => illegal_rate = Some(next_parsed(args, &mut i, "--illegal-rate")),
            other => unknown_option("drift baseline", other),
        }
    }
    let vocab_path = required(vocab_path, "--vocab", "drift baseline");
    let corpus = required(corpus, "--corpus", "drift baseline");
    let out = required(out, "--out", "drift baseline");

    let vocab = Vocabulary::load(&vocab_path).or_die("failed to load vocabulary");
    let (games, seqs) = encode_corpus(&vocab, &corpus);
    let mut baseline =
        DriftBaseline::from_sequences(&seqs, vocab.len()).with_vocab_hash(vocab.corpus_hash());
    if let Some(r) = illegal_rate {
        baseline = baseline
            .with_illegal_suggestion_rate(r)
            .or_die("invalid --illegal-rate");
    }
    baseline.save(&out).or_die(&format!("failed to write {out}"));
    println!("Baseline:");
    println!("  - Sequences: {games}");
    println!("  - UNK rate: {:.4}", baseline.stats.unk_rate());
    println!("  - Mean length: {:.2}", baseline.stats.mean_length());
    println!("  - Written: {out}");
}

fn cmd_drift_compare(args: &[String]) {
    let mut vocab_path: Option<String> = None;
    let mut corpus: Option<String> = None;
    let mut baseline_path: Option<String> = None;
    let mut config_path: Option<String> = None;
    let mut illegal_rate: Option<f64> = None;
    let mut events: Option<String> = None;

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!(
                    r#"mc drift compare

USAGE:
    mc drift compare --vocab FILE --corpus FILE --baseline FILE [OPTIONS]

OPTIONS:
    --config FILE        Take thresholds from the config's drift section
    --illegal-rate R     Illegal-suggestion rate observed over the sample window
    --events FILE        Append a drift_report NDJSON event
"#
                );
                return;
            }
            "--vocab" => vocab_path = Some(next_value(args, &mut i, "--vocab")),
            "--corpus" => corpus = Some(next_value(args, &mut i, "--corpus")),
            "--baseline" => baseline_path = Some(next_value(args, &mut i, "--baseline")),
            "--config" => config_path = Some(next_value(args, &mut i, "--config")),
            "--illegal-rate" => illegal_rate = Some(next_parsed(args, &mut i, "--illegal-rate")),
            "--events" => events = Some(next_value(args, &mut i, "--events")),
            other => unknown_option("drift compare", other),
        }
    }
    let vocab_path = required(vocab_path, "--vocab", "drift compare");
    let corpus = required(corpus, "--corpus", "drift compare");
    let baseline_path = required(baseline_path, "--baseline", "drift compare");

    let thresholds = match &config_path {
        Some(p) => DriftThresholds::from(&load_config(p).0.drift),
        None => DriftThresholds::default(),
    };
    let vocab = Vocabulary::load(&vocab_path).or_die("failed to load vocabulary");
    let baseline = DriftBaseline::load(&baseline_path).or_die("failed to load baseline");
    baseline
        .check_vocab(vocab.corpus_hash())
        .or_die("cannot compare against this baseline");
    let (_, seqs) = encode_corpus(&vocab, &corpus);
    let stats = SequenceStats::from_sequences(&seqs);
    let report = compare_stats(&stats, illegal_rate, &baseline, &thresholds);

    if let Some(path) = events {
        let mut w = NdjsonWriter::open_append(&path).or_die("failed to open events file");
        w.write_event(&DriftReportEventV1 {
            event: "drift_report",
            ts_ms: now_ms(),
            baseline_created_ts_ms: baseline.created_ts_ms,
            report: &report,
        })
        .or_die("failed to write event");
        w.flush().or_die("failed to flush events");
    }
    print_json(&report);
}

// ============================================================
// adapters
// ============================================================

fn cmd_adapters_merge(args: &[String]) {
    let mut base: Option<String> = None;
    let mut adapters: Vec<String> = Vec::new();
    let mut out: Option<String> = None;

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!(
                    r#"mc adapters merge

USAGE:
    mc adapters merge --base FILE --adapter FILE [--adapter FILE]... --out FILE

Folds LoRA deltas into the base weights, in the order given.
"#
                );
                return;
            }
            "--base" => base = Some(next_value(args, &mut i, "--base")),
            "--adapter" => adapters.push(next_value(args, &mut i, "--adapter")),
            "--out" => out = Some(next_value(args, &mut i, "--out")),
            other => unknown_option("adapters merge", other),
        }
    }
    let base = required(base, "--base", "adapters merge");
    let out = required(out, "--out", "adapters merge");

    let weights = load_base_file(&base).or_die(&format!("failed to load base {base}"));
    let mut deltas: Vec<AdapterDelta> = Vec::new();
    for path in &adapters {
        let bytes = fs::read(path).or_die(&format!("failed to read adapter {path}"));
        deltas.extend(load_adapter(&bytes).or_die(&format!("invalid adapter {path}")));
    }
    let merged = apply_adapters(&weights, &deltas).or_die("failed to apply adapters");
    let meta = HashMap::from([("merged_adapters".to_string(), adapters.join(","))]);
    save_weights(&merged, Some(meta), &out).or_die(&format!("failed to write {out}"));
    println!(
        "Merged {} deltas from {} adapters into {out}",
        deltas.len(),
        adapters.len()
    );
}

// ============================================================
// main
// ============================================================

fn print_help() {
    eprintln!(
        r#"mc - chess move prediction core

USAGE:
    mc <COMMAND> [OPTIONS]

COMMANDS:
    vocab build         Build a move vocabulary from a corpus
    window              Cut encoded games into training windows (safetensors shards)
    init-model          Write seeded random base weights for a vocabulary
    predict             Suggest legal next moves for a history
    rollout             Sample a legal continuation of a history
    eval                Top-1 accuracy and perplexity over a corpus
    serve               Run the HTTP prediction server
    drift baseline      Rebuild drift reference statistics
    drift compare       Compare a sample corpus against a baseline
    adapters merge      Fold LoRA adapters into base weights

OPTIONS:
    -h, --help          Print this help message
    -V, --version       Print version

Run `mc <COMMAND> --help` for command options. Set RUST_LOG to change log levels.
"#
    );
}

fn print_version() {
    println!("mc {}", env!("CARGO_PKG_VERSION"));
}

fn sub<'a>(args: &'a [String], group: &str, usage: &str) -> (&'a str, &'a [String]) {
    if args.len() < 3 {
        eprintln!("Usage: mc {group} {usage} [OPTIONS]");
        process::exit(1);
    }
    (args[2].as_str(), &args[3..])
}

fn main() {
    init_tracing(DEFAULT_LOG_DIRECTIVE);
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        process::exit(0);
    }

    match args[1].as_str() {
        "-h" | "--help" | "help" => print_help(),
        "-V" | "--version" => print_version(),
        "vocab" => match sub(&args, "vocab", "build") {
            ("build", rest) => cmd_vocab_build(rest),
            (other, _) => die(format!("Unknown vocab subcommand: {other}")),
        },
        "window" => cmd_window(&args[2..]),
        "init-model" => cmd_init_model(&args[2..]),
        "predict" => cmd_predict(&args[2..]),
        "rollout" => cmd_rollout(&args[2..]),
        "eval" => cmd_eval(&args[2..]),
        "serve" => cmd_serve(&args[2..]),
        "drift" => match sub(&args, "drift", "<baseline|compare>") {
            ("baseline", rest) => cmd_drift_baseline(rest),
            ("compare", rest) => cmd_drift_compare(rest),
            (other, _) => die(format!("Unknown drift subcommand: {other}")),
        },
        "adapters" => match sub(&args, "adapters", "merge") {
            ("merge", rest) => cmd_adapters_merge(rest),
            (other, _) => die(format!("Unknown adapters subcommand: {other}")),
        },
        cmd => {
            eprintln!("Unknown command: {cmd}");
            eprintln!("Run `mc --help` for usage.");
            process::exit(1);
        }
    }
}
