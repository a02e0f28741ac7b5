//! JSON wire types for the serving boundary (v1).

use mc_infer::Prediction;
use mc_oracle::TerminalKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: u32 = 1;

pub const PATH_PREDICT: &str = "/predict/next-move";
pub const PATH_HEALTH: &str = "/health";
pub const PATH_METRICS: &str = "/metrics";

/// Upper bound on accepted request bodies.
pub const MAX_BODY_BYTES: u64 = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PredictRequestV1 {
    /// SAN history from the standard start position.
    pub moves: Vec<String>,
    /// Kept as raw JSON so a wrong type is reported against this field
    /// rather than as a malformed body.
    #[serde(default)]
    pub num_suggestions: Option<Value>,
    #[serde(default)]
    pub temperature: Option<Value>,
    /// Adapter names, applied in order.
    #[serde(default)]
    pub adapters: Vec<String>,
}

/// A request field that is present but of the wrong JSON type or sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub reason: String,
}

impl PredictRequestV1 {
    /// `None` when omitted. Range checks beyond `>= 1` are the engine's.
    pub fn num_suggestions(&self) -> Result<Option<usize>, FieldError> {
        let Some(v) = &self.num_suggestions else {
            return Ok(None);
        };
        if let Some(n) = v.as_u64() {
            return Ok(Some(usize::try_from(n).unwrap_or(usize::MAX)));
        }
        let reason = if v.as_i64().is_some() {
            format!("num_suggestions must be >= 1, got {v}")
        } else {
            format!("num_suggestions must be an integer, got {v}")
        };
        Err(FieldError {
            field: "num_suggestions",
            reason,
        })
    }

    /// `None` when omitted. Positivity is checked by the engine.
    pub fn temperature(&self) -> Result<Option<f32>, FieldError> {
        let Some(v) = &self.temperature else {
            return Ok(None);
        };
        match v.as_f64() {
            Some(t) => Ok(Some(t as f32)),
            None => Err(FieldError {
                field: "temperature",
                reason: format!("temperature must be a number, got {v}"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SuggestionV1 {
    #[serde(rename = "move")]
    pub mv: String,
    pub probability: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PredictResponseV1 {
    pub suggestions: Vec<SuggestionV1>,
    pub terminal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_kind: Option<TerminalKind>,
    pub end_of_game_probability: f32,
    pub adapter_version: u64,
    pub unk_substitutions: u32,
}

impl From<&Prediction> for PredictResponseV1 {
    fn from(p: &Prediction) -> Self {
        Self {
            suggestions: p
                .candidates
                .iter()
                .map(|c| SuggestionV1 {
                    mv: c.mv.clone(),
                    probability: c.probability,
                })
                .collect(),
            terminal: p.terminal,
            terminal_kind: p.terminal_kind,
            end_of_game_probability: p.end_of_game_probability,
            adapter_version: p.adapter_version,
            unk_substitutions: p.unk_substitutions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HealthResponseV1 {
    pub status: String,
    pub protocol_version: u32,
    pub models_loaded: bool,
    pub vocab_size: usize,
    pub adapter_version: u64,
    pub adapters: Vec<String>,
}

/// Error body. `field` names the offending request field for 400s.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ErrorResponseV1 {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}
