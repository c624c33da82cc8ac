//! Prometheus metrics endpoint.

use crate::server::CourierRelay;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::fmt::Write;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Gauges reflect current state; counters are monotonic since startup.
pub async fn metrics_handler(Extension(relay): Extension<Arc<CourierRelay>>) -> impl IntoResponse {
    let m = relay.metrics();
    let clients = relay.directory().len().await;

    let mut body = String::new();
    gauge(
        &mut body,
        "courier_relay_clients_registered",
        "Number of registered names",
        clients as u64,
    );
    gauge(
        &mut body,
        "courier_relay_connections_active",
        "Number of open WebSocket connections",
        relay.active_connections() as u64,
    );
    let _ = writeln!(
        body,
        "# HELP courier_relay_info Server information\n# TYPE courier_relay_info gauge\ncourier_relay_info{{version=\"{}\"}} 1\n",
        env!("CARGO_PKG_VERSION")
    );

    let counters = [
        ("courier_relay_connections_total", "Total connections accepted", &m.connections_total),
        ("courier_relay_declarations_total", "Total declarations handled", &m.declarations_total),
        ("courier_relay_transfers_total", "Total transfers handled", &m.transfers_total),
        ("courier_relay_deliveries_total", "Total deliveries queued to receivers", &m.deliveries_total),
        ("courier_relay_warnings_total", "Total warnings sent to clients", &m.warnings_total),
        ("courier_relay_evictions_total", "Total heartbeat evictions", &m.evictions_total),
        ("courier_relay_malformed_total", "Total undecodable frames", &m.malformed_total),
        ("courier_relay_rate_limit_hits_total", "Total rate limit rejections", &m.rate_limit_hits),
    ];
    for (name, help, value) in counters {
        let _ = writeln!(
            body,
            "# HELP {name} {help}\n# TYPE {name} counter\n{name} {}\n",
            value.load(Ordering::Relaxed)
        );
    }

    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

fn gauge(body: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(body, "# HELP {name} {help}\n# TYPE {name} gauge\n{name} {value}\n");
}
