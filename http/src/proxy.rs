//! Forward-proxy routing for client connections.
//!
//! With proxy options set, the client dials the proxy endpoint instead of
//! the origin and carries a request transform that rewrites origin-form
//! targets to absolute-form, which is what a plain forward proxy expects.
//! CONNECT tunneling and proxy authentication are handled by a higher
//! layer.

use std::sync::Arc;

use channel_io::TlsOptions;
use tracing::debug;

use crate::client::{ClientConnectionOptions, connect_internal};
use crate::error::HttpError;
use crate::subject;

/// Rewrites an outgoing request target before the stream layer serializes
/// it. Stored on client connections established through a proxy.
pub type ProxyRequestTransform = Arc<dyn Fn(&mut String) + Send + Sync>;

/// Where to reach the proxy, and how.
#[derive(Debug, Clone)]
pub struct ProxyOptions {
    pub host_name: String,
    pub port: u16,
    /// TLS toward the proxy itself, if any.
    pub tls_options: Option<TlsOptions>,
}

/// Redirect the dial at the proxy and install the absolute-form transform.
pub(crate) fn connect_via_proxy(mut options: ClientConnectionOptions) -> Result<(), HttpError> {
    let proxy = options
        .proxy_options
        .take()
        .ok_or(HttpError::InvalidArgument)?;
    if proxy.host_name.is_empty() {
        return Err(HttpError::InvalidArgument);
    }

    debug!(
        target: subject::CONNECTION,
        proxy = %proxy.host_name,
        proxy_port = proxy.port,
        origin = %options.host_name,
        "routing client connection through proxy"
    );

    let scheme = if options.tls_options.is_some() {
        "https"
    } else {
        "http"
    };
    let authority = format!("{}:{}", options.host_name, options.port);
    options.proxy_request_transform = Some(Arc::new(move |target: &mut String| {
        if target.starts_with('/') {
            *target = format!("{scheme}://{authority}{target}");
        }
    }));

    // The channel reaches only as far as the proxy; TLS on it is the
    // proxy's, not the origin's.
    options.tls_options = proxy.tls_options;
    options.host_name = proxy.host_name;
    options.port = proxy.port;

    connect_internal(options)
}
