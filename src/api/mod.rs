//! Read-only dashboard endpoint.
//!
//! A minimal HTTP/1.1 responder on a plain `TcpListener`: one request per
//! connection, GET only, JSON bodies. When bound to loopback it refuses
//! non-loopback peers.

use crate::dashboard::Dashboard;
use crate::detect::{ModelGate, ModelStatus};
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const MAX_HEAD_BYTES: u64 = 8192;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8808".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("dashboard api thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    views: Views,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, dashboard: Dashboard, gate: Arc<ModelGate>) -> Self {
        Self {
            cfg,
            views: Views { dashboard, gate },
        }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let requested: SocketAddr = self
            .cfg
            .addr
            .parse()
            .map_err(|e| anyhow!("invalid api addr '{}': {}", self.cfg.addr, e))?;
        let listener = TcpListener::bind(requested)?;
        let addr = listener.local_addr()?;
        if requested.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api requested loopback '{}' but bound '{}'",
                requested,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&shutdown);
        let views = self.views;
        let join = std::thread::Builder::new()
            .name("dashboard-api".to_string())
            .spawn(move || serve(&listener, &views, &stop))?;
        log::info!("dashboard api listening on http://{}", addr);

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

struct Views {
    dashboard: Dashboard,
    gate: Arc<ModelGate>,
}

#[derive(Serialize)]
struct ModelView {
    #[serde(flatten)]
    status: ModelStatus,
    backend: Option<&'static str>,
}

/// Endpoints the dashboard exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Route {
    Health,
    Stats,
    History,
    Model,
}

impl Route {
    fn resolve(path: &str) -> Option<Self> {
        match path {
            "/health" => Some(Route::Health),
            "/stats" => Some(Route::Stats),
            "/history" => Some(Route::History),
            "/model" => Some(Route::Model),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Status {
    Ok,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    Internal,
}

impl Status {
    fn line(self) -> &'static str {
        match self {
            Status::Ok => "200 OK",
            Status::Forbidden => "403 Forbidden",
            Status::NotFound => "404 Not Found",
            Status::MethodNotAllowed => "405 Method Not Allowed",
            Status::Internal => "500 Internal Server Error",
        }
    }
}

struct Response {
    status: Status,
    body: Vec<u8>,
}

impl Response {
    fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status: Status::Ok,
                body,
            },
            Err(err) => {
                log::error!("failed to serialise dashboard view: {}", err);
                Self::error(Status::Internal, "internal")
            }
        }
    }

    fn error(status: Status, code: &str) -> Self {
        Self {
            status,
            body: format!(r#"{{"error":"{code}"}}"#).into_bytes(),
        }
    }

    fn send(&self, stream: &mut TcpStream) -> Result<()> {
        write!(
            stream,
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
            self.status.line(),
            self.body.len()
        )?;
        stream.write_all(&self.body)?;
        stream.flush()?;
        Ok(())
    }
}

fn serve(listener: &TcpListener, views: &Views, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(err) = handle_connection(stream, peer, views) {
                    log::warn!("dashboard api request from {} failed: {}", peer, err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_BACKOFF);
            }
            Err(err) => {
                log::error!("dashboard api stopped: {}", err);
                return;
            }
        }
    }
}

fn handle_connection(mut stream: TcpStream, peer: SocketAddr, views: &Views) -> Result<()> {
    // Accepted sockets may inherit the listener's non-blocking mode.
    stream.set_nonblocking(false)?;
    let local = stream.local_addr()?;
    let response = if local.ip().is_loopback() && !peer.ip().is_loopback() {
        Response::error(Status::Forbidden, "forbidden")
    } else {
        let (method, path) = read_request_line(&stream)?;
        log::debug!("{} {}", method, path);
        respond(views, &method, &path)
    };
    response.send(&mut stream)
}

fn respond(views: &Views, method: &str, path: &str) -> Response {
    if method != "GET" {
        return Response::error(Status::MethodNotAllowed, "method_not_allowed");
    }
    match Route::resolve(path) {
        Some(Route::Health) => Response::json(&serde_json::json!({ "status": "ok" })),
        Some(Route::Stats) => Response::json(&views.dashboard.snapshot_view()),
        Some(Route::History) => Response::json(&views.dashboard.history_view()),
        Some(Route::Model) => Response::json(&ModelView {
            status: views.gate.status(),
            backend: views.gate.backend_name(),
        }),
        None => Response::error(Status::NotFound, "not_found"),
    }
}

/// Read the request head and return its method and path (query stripped).
/// Bodies are never read; every route is a GET.
fn read_request_line(stream: &TcpStream) -> Result<(String, String)> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut reader = BufReader::new(stream.take(MAX_HEAD_BYTES));

    let mut request_line = String::new();
    if reader.read_line(&mut request_line)? == 0 {
        return Err(anyhow!("empty request"));
    }
    let mut header = String::new();
    loop {
        header.clear();
        if reader.read_line(&mut header)? == 0 || header.trim_end().is_empty() {
            break;
        }
    }

    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let target = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let path = target.split('?').next().unwrap_or(target);
    Ok((method.to_string(), path.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::StatsAggregator;

    fn views() -> Views {
        Views {
            dashboard: Dashboard::new(Arc::new(StatsAggregator::new())),
            gate: Arc::new(ModelGate::new()),
        }
    }

    #[test]
    fn routes_resolve_exact_paths_only() {
        assert_eq!(Route::resolve("/stats"), Some(Route::Stats));
        assert_eq!(Route::resolve("/stats/"), None);
        assert_eq!(Route::resolve("/"), None);
    }

    #[test]
    fn non_get_is_rejected_before_routing() {
        let response = respond(&views(), "DELETE", "/nowhere");
        assert_eq!(response.status, Status::MethodNotAllowed);
    }

    #[test]
    fn model_view_flattens_gate_status() {
        let response = respond(&views(), "GET", "/model");
        assert_eq!(response.status, Status::Ok);
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"state": "uninitialized", "backend": null})
        );
    }
}
