//! Bootstrap factories: dial or listen, producing channels.
//!
//! A bootstrap wraps the transport layer (TCP, optionally TLS) and the event
//! loops it schedules channels onto. The lifecycle layer never touches
//! sockets directly; it hands a bootstrap an events object and waits for the
//! setup callback.

use std::io;
use std::sync::Arc;

use crate::{Channel, ErrorCode, SocketOptions, TlsOptions};

/// A listening address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Callbacks for one dialed channel.
///
/// Ordering contract, per channel: `on_setup` fires exactly once;
/// `on_shutdown` fires exactly once afterwards, and only if setup delivered
/// a channel. Both fire on the channel's event-loop thread.
pub trait ChannelEvents: Send + Sync {
    /// Transport setup finished. `Ok` carries the live channel; `Err`
    /// carries a non-zero error code and no channel exists.
    fn on_setup(&self, result: Result<Arc<dyn Channel>, ErrorCode>);

    /// The channel completed shutdown. Fires before the channel is
    /// destroyed; the stages are still intact.
    fn on_shutdown(&self, channel: &Arc<dyn Channel>, error_code: ErrorCode);
}

/// Callbacks for a listening socket and every channel it accepts.
///
/// `on_accept_setup` / `on_accept_shutdown` follow the same per-channel
/// ordering as [`ChannelEvents`]. `on_listener_destroy` fires once, after
/// the listener has stopped and every accepted channel has finished
/// shutting down.
pub trait AcceptEvents: Send + Sync {
    fn on_accept_setup(&self, result: Result<Arc<dyn Channel>, ErrorCode>);

    fn on_accept_shutdown(&self, channel: &Arc<dyn Channel>, error_code: ErrorCode);

    fn on_listener_destroy(&self);
}

/// Dials outbound connections and wraps each in a channel.
///
/// Both dial methods return as soon as the attempt is queued; success or
/// failure is delivered through `events`. A synchronous `Err` means nothing
/// was queued and no callback will fire.
pub trait ClientBootstrap: Send + Sync {
    fn new_socket_channel(
        &self,
        host_name: &str,
        port: u16,
        socket_options: &SocketOptions,
        events: Arc<dyn ChannelEvents>,
    ) -> io::Result<()>;

    fn new_tls_socket_channel(
        &self,
        host_name: &str,
        port: u16,
        socket_options: &SocketOptions,
        tls_options: &TlsOptions,
        events: Arc<dyn ChannelEvents>,
    ) -> io::Result<()>;
}

/// Handle to a live listening socket.
pub trait ListenerSocket: Send + Sync {
    fn local_endpoint(&self) -> Endpoint;
}

/// Binds listening sockets and wraps accepted connections in channels.
///
/// The bootstrap guarantees that no accept callback fires before
/// `new_socket_listener` returns the listener handle.
pub trait ServerBootstrap: Send + Sync {
    fn new_socket_listener(
        &self,
        endpoint: &Endpoint,
        socket_options: &SocketOptions,
        events: Arc<dyn AcceptEvents>,
    ) -> io::Result<Arc<dyn ListenerSocket>>;

    fn new_tls_socket_listener(
        &self,
        endpoint: &Endpoint,
        socket_options: &SocketOptions,
        tls_options: &TlsOptions,
        events: Arc<dyn AcceptEvents>,
    ) -> io::Result<Arc<dyn ListenerSocket>>;

    /// Stop listening and tear the listener down. Asynchronous; completion
    /// is signaled through [`AcceptEvents::on_listener_destroy`] once all
    /// accepted channels have finished shutting down.
    fn destroy_socket_listener(&self, socket: &Arc<dyn ListenerSocket>);
}
