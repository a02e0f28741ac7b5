//! Move-list corpus parsing.
//!
//! PGN ingestion happens upstream; what arrives here is one game per line,
//! moves separated by whitespace. Move numbers (`1.`, `12...`, `3.Nf3`),
//! results, NAGs (`$1`) and `{...}` comments are tolerated and dropped.
//! Lines starting with `#` or `[` are skipped.

use std::fs;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}, token {column}: {token:?} is not a move")]
    Malformed {
        line: usize,
        column: usize,
        token: String,
    },
    #[error("line {line}: unterminated comment")]
    UnterminatedComment { line: usize },
}

const RESULTS: [&str; 4] = ["1-0", "0-1", "1/2-1/2", "*"];

/// Shape check only; legality is the oracle's job.
pub fn is_plausible_san(tok: &str) -> bool {
    let core = tok.trim_end_matches(&['+', '#', '!', '?'][..]);
    if matches!(core, "O-O" | "O-O-O" | "0-0" | "0-0-0") {
        return true;
    }
    if core.len() < 2 || core.len() > 7 {
        return false;
    }
    let valid_chars = core
        .chars()
        .all(|c| matches!(c, 'a'..='h' | '1'..='8' | 'K' | 'Q' | 'R' | 'B' | 'N' | 'x' | '='));
    let has_file = core.chars().any(|c| matches!(c, 'a'..='h'));
    let has_rank = core.chars().any(|c| matches!(c, '1'..='8'));
    valid_chars && has_file && has_rank
}

/// Strip a leading move number (`12.` / `12...`), returning what follows.
fn strip_move_number(tok: &str) -> Option<&str> {
    let digits = tok.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let rest = &tok[digits..];
    let dots = rest.chars().take_while(|&c| c == '.').count();
    if dots == 0 {
        return None;
    }
    Some(&rest[dots..])
}

/// Parse one corpus line. `Ok(None)` for blank/header/comment lines.
pub fn parse_game_line(line: &str, line_no: usize) -> Result<Option<Vec<String>>, CorpusError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('[') {
        return Ok(None);
    }

    let mut moves = Vec::new();
    let mut in_comment = false;
    for (column, raw) in trimmed.split_whitespace().enumerate() {
        let mut tok = raw;
        if in_comment {
            if let Some(end) = tok.find('}') {
                in_comment = false;
                tok = &tok[end + 1..];
            } else {
                continue;
            }
        }
        if let Some(start) = tok.find('{') {
            match tok[start..].find('}') {
                Some(end) => {
                    let after = &tok[start + end + 1..];
                    if start == 0 && after.is_empty() {
                        continue;
                    }
                    // `e4{comment}` style: keep the part before the brace.
                    tok = &tok[..start];
                }
                None => {
                    in_comment = true;
                    tok = &tok[..start];
                }
            }
        }
        if tok.is_empty() || tok.starts_with('$') || RESULTS.contains(&tok) {
            continue;
        }
        if let Some(rest) = strip_move_number(tok) {
            if rest.is_empty() {
                continue;
            }
            tok = rest;
        }
        if !is_plausible_san(tok) {
            return Err(CorpusError::Malformed {
                line: line_no,
                column,
                token: raw.to_string(),
            });
        }
        moves.push(tok.trim_end_matches(&['!', '?'][..]).to_string());
    }
    if in_comment {
        return Err(CorpusError::UnterminatedComment { line: line_no });
    }
    Ok(Some(moves))
}

/// Parse a whole corpus string; games keep their line order.
pub fn parse_corpus(text: &str) -> Result<Vec<Vec<String>>, CorpusError> {
    let mut games = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if let Some(g) = parse_game_line(line, i + 1)? {
            if !g.is_empty() {
                games.push(g);
            }
        }
    }
    Ok(games)
}

pub fn read_corpus(path: impl AsRef<Path>) -> Result<Vec<Vec<String>>, CorpusError> {
    let text = fs::read_to_string(path)?;
    parse_corpus(&text)
}
