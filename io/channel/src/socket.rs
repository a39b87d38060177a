//! Socket configuration carried through a bootstrap to the transport.

use std::time::Duration;

/// Per-connection socket knobs.
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Abandon a dial attempt that has not completed within this window.
    pub connect_timeout: Duration,
    /// Set `TCP_NODELAY` on the socket.
    pub tcp_nodelay: bool,
    /// Enable TCP keepalive probes.
    pub keepalive: bool,
}

impl Default for SocketOptions {
    fn default() -> Self {
        SocketOptions {
            connect_timeout: Duration::from_secs(3),
            tcp_nodelay: true,
            keepalive: false,
        }
    }
}
