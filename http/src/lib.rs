//! http-conn - HTTP/1.1 and HTTP/2 connection lifecycle atop a byte-channel
//! pipeline.
//!
//! This crate accepts or initiates a transport (TCP, optionally TLS),
//! decides the HTTP version from the negotiated ALPN protocol, splices the
//! matching protocol handler into the channel as a processing stage, and
//! manages the connection's lifetime against the lifetime of its channel.
//! Frame and message parsing, the channel runtime, and the TLS stages
//! themselves are external collaborators reached through the `channel-io`
//! interfaces.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use http_conn::{ClientConnectionOptions, client_connect};
//!
//! # fn bootstrap() -> Arc<dyn channel_io::ClientBootstrap> { unimplemented!() }
//! http_conn::library_init();
//!
//! client_connect(ClientConnectionOptions {
//!     bootstrap: bootstrap(),
//!     host_name: "example.com".to_string(),
//!     port: 80,
//!     socket_options: Default::default(),
//!     tls_options: None,
//!     initial_window_size: 65_536,
//!     on_setup: Box::new(|result| match result {
//!         Ok(connection) => println!("connected: {}", connection.version()),
//!         Err(e) => eprintln!("connect failed: {e}"),
//!     }),
//!     on_shutdown: Some(Box::new(|_connection, _result| {
//!         println!("connection shut down");
//!     })),
//!     proxy_options: None,
//!     proxy_request_transform: None,
//!     dialer: None,
//! })
//! .unwrap();
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

pub mod client;
pub mod connection;
pub mod dialer;
pub mod error;
pub mod metrics;
mod proto;
pub mod proxy;
pub mod server;
pub mod version;

pub use client::{ClientConnectionOptions, OnClientSetup, OnClientShutdown, client_connect};
pub use connection::{
    Connection, OnConnectionShutdown, OnIncomingRequest, ServerConnectionOptions,
};
pub use dialer::{Dialer, SystemDialer, set_default_dialer};
pub use error::HttpError;
pub use proxy::{ProxyOptions, ProxyRequestTransform};
pub use server::{OnIncomingConnection, OnServerDestroy, Server, ServerOptions};
pub use version::{ALPN_H2, ALPN_HTTP_1_1, HttpVersion};

/// Log targets, one per subsystem, so operators can filter.
pub mod subject {
    pub const GENERAL: &str = "http::general";
    pub const CONNECTION: &str = "http::connection";
    pub const SERVER: &str = "http::server";
    pub const STREAM: &str = "http::stream";
    pub const CONNECTION_MANAGER: &str = "http::connection_manager";
    pub const WEBSOCKET: &str = "http::websocket";
    pub const WEBSOCKET_SETUP: &str = "http::websocket_setup";
}

/// Shortcuts for common HTTP request methods.
pub mod method {
    pub const GET: &[u8] = b"GET";
    pub const HEAD: &[u8] = b"HEAD";
    pub const POST: &[u8] = b"POST";
    pub const PUT: &[u8] = b"PUT";
    pub const DELETE: &[u8] = b"DELETE";
    pub const CONNECT: &[u8] = b"CONNECT";
    pub const OPTIONS: &[u8] = b"OPTIONS";
}

static LIBRARY_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize the library. Must be called before any other operation; not
/// reentrant.
pub fn library_init() {
    let was_initialized = LIBRARY_INITIALIZED.swap(true, Ordering::AcqRel);
    assert!(!was_initialized, "library_init() called twice");
}

/// Tear the library down. Must not be called until all usage has ceased;
/// not reentrant.
pub fn library_clean_up() {
    let was_initialized = LIBRARY_INITIALIZED.swap(false, Ordering::AcqRel);
    assert!(was_initialized, "library_clean_up() without library_init()");
}

pub(crate) fn fatal_assert_library_initialized() {
    assert!(
        LIBRARY_INITIALIZED.load(Ordering::Acquire),
        "library_init() must be called before using http-conn"
    );
}

/// The description of common status codes, e.g. `404` -> `"Not Found"`. An
/// empty string is returned if the status code is not recognized.
pub fn status_text(status_code: u16) -> &'static str {
    match status_code {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        305 => "Use Proxy",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Range Not Satisfiable",
        417 => "Expectation Failed",
        426 => "Upgrade Required",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => "",
    }
}
