//! `tiny_http` socket loop: `workers` threads share one listener.

use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tiny_http::{Header, Request, Response, Server, StatusCode};
use tracing::{debug, info, warn};

use crate::handler::{handle, AppState, HttpReply};
use crate::protocol::MAX_BODY_BYTES;

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },
    #[error("failed to spawn worker: {0}")]
    Spawn(std::io::Error),
}

/// Running server; dropping it without [`ServerHandle::shutdown`] leaves the workers running.
pub struct ServerHandle {
    server: Arc<Server>,
    workers: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }

    /// Block until every worker exits.
    pub fn join(self) {
        for w in self.workers {
            let _ = w.join();
        }
    }

    /// Stop accepting requests and wait for in-flight ones to finish.
    pub fn shutdown(self) {
        let ServerHandle { server, workers } = self;
        release(&server, workers);
    }
}

/// One unblock per worker, then join them all.
fn release(server: &Server, workers: Vec<JoinHandle<()>>) {
    for _ in 0..workers.len() {
        server.unblock();
    }
    for w in workers {
        let _ = w.join();
    }
}

fn worker(server: &Server, state: &AppState) {
    for request in server.incoming_requests() {
        serve_one(state, request);
    }
}

/// Start `n` workers with `spawn`. If any spawn fails, the ones already
/// running are released before the error is returned.
pub(crate) fn spawn_workers<F>(
    server: &Server,
    n: usize,
    mut spawn: F,
) -> Result<Vec<JoinHandle<()>>, ServeError>
where
    F: FnMut(usize) -> std::io::Result<JoinHandle<()>>,
{
    let mut handles = Vec::with_capacity(n);
    for i in 0..n {
        match spawn(i) {
            Ok(h) => handles.push(h),
            Err(e) => {
                warn!(error = %e, started = handles.len(), "worker spawn failed");
                release(server, handles);
                return Err(ServeError::Spawn(e));
            }
        }
    }
    Ok(handles)
}

fn json_header() -> Option<Header> {
    Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).ok()
}

fn respond(request: Request, reply: HttpReply) {
    let mut resp = Response::from_string(reply.body).with_status_code(StatusCode(reply.status));
    if let Some(h) = json_header() {
        resp.add_header(h);
    }
    if let Err(e) = request.respond(resp) {
        warn!(error = %e, "failed to write response");
    }
}

fn serve_one(state: &AppState, mut request: Request) {
    let method = request.method().as_str().to_string();
    let path = request.url().to_string();

    let mut body = Vec::new();
    let read = request
        .as_reader()
        .take(MAX_BODY_BYTES + 1)
        .read_to_end(&mut body);
    let reply = match read {
        Err(e) => HttpReply {
            status: 400,
            body: serde_json::json!({ "error": format!("failed to read body: {e}"), "field": "body" })
                .to_string(),
        },
        Ok(_) if body.len() as u64 > MAX_BODY_BYTES => HttpReply {
            status: 413,
            body: serde_json::json!({ "error": format!("body exceeds {MAX_BODY_BYTES} bytes"), "field": "body" })
                .to_string(),
        },
        Ok(_) => handle(state, &method, &path, &body),
    };
    debug!(%method, %path, status = reply.status, "request");
    respond(request, reply);
}

/// Bind `addr` and start `workers` threads.
pub fn start(state: Arc<AppState>, addr: &str, workers: usize) -> Result<ServerHandle, ServeError> {
    let server = Server::http(addr).map_err(|e| ServeError::Bind {
        addr: addr.to_string(),
        reason: e.to_string(),
    })?;
    let server = Arc::new(server);
    let n = workers.max(1);
    let handles = spawn_workers(&server, n, |i| {
        let server = Arc::clone(&server);
        let state = Arc::clone(&state);
        thread::Builder::new()
            .name(format!("mc-serve-{i}"))
            .spawn(move || worker(&server, &state))
    })?;
    let handle = ServerHandle {
        server,
        workers: handles,
    };
    info!(addr = ?handle.local_addr(), workers = n, "listening");
    Ok(handle)
}

/// Serve until the process exits.
pub fn serve(state: Arc<AppState>, addr: &str, workers: usize) -> Result<(), ServeError> {
    start(state, addr, workers)?.join();
    Ok(())
}
