//! Connection lifecycle metrics.
//!
//! The live-object gauges double as a leak oracle in tests: after a full
//! setup/teardown cycle each must read zero.

use metriken::{Counter, Gauge, metric};

#[metric(
    name = "http_connections_established",
    description = "Total HTTP connections successfully installed into a channel"
)]
pub static CONNECTIONS_ESTABLISHED: Counter = Counter::new();

#[metric(
    name = "http_connections_active",
    description = "HTTP connection objects currently alive"
)]
pub static CONNECTIONS_ACTIVE: Gauge = Gauge::new();

#[metric(
    name = "http_servers_active",
    description = "HTTP server listeners currently alive"
)]
pub static SERVERS_ACTIVE: Gauge = Gauge::new();

#[metric(
    name = "http_client_connects_in_flight",
    description = "Client connect records not yet resolved by setup or shutdown"
)]
pub static CLIENT_CONNECTS_IN_FLIGHT: Gauge = Gauge::new();

#[metric(
    name = "http_alpn_fallbacks",
    description = "TLS negotiations that produced an empty or unrecognized ALPN protocol"
)]
pub static ALPN_FALLBACKS: Counter = Counter::new();
