//! Request dispatch, independent of the socket layer.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use mc_infer::{InferenceEngine, PredictError, PredictOptions};
use mc_logging::{now_ms, NdjsonWriter, PredictionEventV1};
use serde::Serialize;
use tracing::{error, warn};

use crate::protocol::{
    ErrorResponseV1, HealthResponseV1, PredictRequestV1, PredictResponseV1, PATH_HEALTH,
    PATH_METRICS, PATH_PREDICT, PROTOCOL_VERSION,
};

/// Status code plus JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self { status, body },
            Err(e) => {
                error!(error = %e, "failed to serialize response");
                Self {
                    status: 500,
                    body: r#"{"error":"internal serialization failure"}"#.to_string(),
                }
            }
        }
    }

    fn error(status: u16, error: impl Into<String>, field: Option<&str>) -> Self {
        Self::json(
            status,
            &ErrorResponseV1 {
                error: error.into(),
                field: field.map(str::to_string),
            },
        )
    }
}

/// Shared by every worker thread.
pub struct AppState {
    pub engine: Arc<InferenceEngine>,
    events: Option<Mutex<NdjsonWriter>>,
}

impl AppState {
    pub fn new(engine: Arc<InferenceEngine>) -> Self {
        Self {
            engine,
            events: None,
        }
    }

    /// Append a `PredictionEventV1` line per served prediction.
    pub fn with_events(mut self, writer: NdjsonWriter) -> Self {
        self.events = Some(Mutex::new(writer));
        self
    }

    fn log_event(&self, event: &PredictionEventV1) {
        let Some(events) = &self.events else {
            return;
        };
        let mut w = events.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = w.write_event(event) {
            warn!(error = %e, "failed to append prediction event");
        }
    }
}

pub fn handle(state: &AppState, method: &str, path: &str, body: &[u8]) -> HttpReply {
    // Query strings are ignored.
    let path = path.split('?').next().unwrap_or(path);
    match (method, path) {
        ("POST", PATH_PREDICT) => predict(state, body),
        ("GET", PATH_HEALTH) => health(state),
        ("GET", PATH_METRICS) => HttpReply::json(200, &state.engine.metrics()),
        (_, PATH_PREDICT | PATH_HEALTH | PATH_METRICS) => {
            HttpReply::error(405, format!("method {method} not allowed on {path}"), None)
        }
        _ => HttpReply::error(404, format!("no route for {path}"), None),
    }
}

fn health(state: &AppState) -> HttpReply {
    let engine = &state.engine;
    let catalog = engine.adapters().snapshot();
    HttpReply::json(
        200,
        &HealthResponseV1 {
            status: "ok".to_string(),
            protocol_version: PROTOCOL_VERSION,
            models_loaded: !engine.base().is_empty(),
            vocab_size: engine.vocab().len(),
            adapter_version: catalog.version(),
            adapters: catalog.names().map(str::to_string).collect(),
        },
    )
}

fn predict(state: &AppState, body: &[u8]) -> HttpReply {
    let t0 = Instant::now();
    let req: PredictRequestV1 = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(e) => return HttpReply::error(400, format!("malformed request: {e}"), Some("body")),
    };

    let (num_suggestions, temperature) = match (req.num_suggestions(), req.temperature()) {
        (Ok(n), Ok(t)) => (n, t),
        (Err(e), _) | (_, Err(e)) => return HttpReply::error(400, e.reason, Some(e.field)),
    };

    let engine = &state.engine;
    let defaults = engine.default_options();
    let opts = PredictOptions {
        num_suggestions: num_suggestions.unwrap_or(defaults.num_suggestions),
        temperature: temperature.unwrap_or(defaults.temperature),
        adapters: req.adapters.clone(),
        cancel: None,
    };

    match engine.predict_next(&req.moves, &opts) {
        Ok(p) => {
            let top = p.candidates.first();
            state.log_event(&PredictionEventV1 {
                event: "prediction",
                ts_ms: now_ms(),
                history_len: req.moves.len(),
                num_suggestions: opts.num_suggestions,
                temperature: opts.temperature,
                adapters: opts.adapters.clone(),
                adapter_version: p.adapter_version,
                terminal: p.terminal,
                returned: p.candidates.len(),
                top_move: top.map(|c| c.mv.clone()),
                top_probability: top.map(|c| c.probability),
                end_of_game_probability: p.end_of_game_probability,
                unk_substitutions: p.unk_substitutions,
                latency_us: t0.elapsed().as_micros() as u64,
            });
            HttpReply::json(200, &PredictResponseV1::from(&p))
        }
        Err(PredictError::Input { field, reason }) => HttpReply::error(400, reason, Some(field)),
        Err(e) => {
            error!(error = %e, "prediction failed");
            HttpReply::error(500, e.to_string(), None)
        }
    }
}
