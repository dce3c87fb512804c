//! # Health Endpoint
//!
//! Optional HTTP side server (enabled by `server.health_addr`) for liveness
//! probes and dashboards. It only reads shared counters and never touches a
//! Wyoming session.
//!
//! ## Routes:
//! - **GET /health**: Status, uptime, model and connection counters
//! - **GET /info**: The capability payload clients receive for `describe`

use crate::state::AppState;
use actix_web::{dev::Server, web, App, HttpResponse, HttpServer};
use serde_json::json;
use std::process;
use tracing_actix_web::TracingLogger;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let stats = state.stats.snapshot();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "uri": state.uri,
        },
        "model": &*state.model,
        "connections": {
            "total": stats.connections_total,
            "active": stats.connections_active,
        },
        "utterances": stats.utterances,
        "failures": stats.failures,
        "memory": get_memory_info(),
    }))
}

pub async fn describe(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(&state.info.data)
}

/// Bind the health server. The returned `Server` must be awaited (or
/// spawned) to run; stop it through `Server::handle`.
pub fn run_health_server(addr: &str, state: AppState) -> std::io::Result<Server> {
    let data = web::Data::new(state);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(TracingLogger::default())
            .route("/health", web::get().to(health_check))
            .route("/info", web::get().to(describe))
    })
    .workers(1)
    .disable_signals()
    .bind(addr)?
    .run();

    Ok(server)
}

fn get_memory_info() -> serde_json::Value {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", process::id())) {
            let read_kb = |key: &str| {
                status
                    .lines()
                    .find(|line| line.starts_with(key))
                    .and_then(|line| line.split_whitespace().nth(1))
                    .and_then(|kb| kb.parse::<u64>().ok())
                    .unwrap_or(0)
                    * 1024
            };

            return json!({
                "resident_memory_bytes": read_kb("VmRSS:"),
                "virtual_memory_bytes": read_kb("VmSize:"),
                "available": true
            });
        }
    }

    json!({
        "pid": process::id(),
        "available": false
    })
}
