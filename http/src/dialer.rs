//! The dial capability the client connect path goes through.
//!
//! Production code uses [`SystemDialer`], which forwards straight to the
//! bootstrap. Tests inject their own [`Dialer`] through
//! [`ClientConnectionOptions::dialer`](crate::client::ClientConnectionOptions)
//! to observe or fail dial attempts without touching a socket. A process-wide
//! default is kept as a convenience for callers that do not inject one.

use std::io;
use std::sync::{Arc, LazyLock};

use channel_io::{ChannelEvents, ClientBootstrap, SocketOptions, TlsOptions};
use parking_lot::RwLock;

/// Indirection over the bootstrap's dial primitives.
pub trait Dialer: Send + Sync {
    fn new_socket_channel(
        &self,
        bootstrap: &Arc<dyn ClientBootstrap>,
        host_name: &str,
        port: u16,
        socket_options: &SocketOptions,
        events: Arc<dyn ChannelEvents>,
    ) -> io::Result<()>;

    fn new_tls_socket_channel(
        &self,
        bootstrap: &Arc<dyn ClientBootstrap>,
        host_name: &str,
        port: u16,
        socket_options: &SocketOptions,
        tls_options: &TlsOptions,
        events: Arc<dyn ChannelEvents>,
    ) -> io::Result<()>;
}

/// The default dialer: hands the dial to the bootstrap unchanged.
pub struct SystemDialer;

impl Dialer for SystemDialer {
    fn new_socket_channel(
        &self,
        bootstrap: &Arc<dyn ClientBootstrap>,
        host_name: &str,
        port: u16,
        socket_options: &SocketOptions,
        events: Arc<dyn ChannelEvents>,
    ) -> io::Result<()> {
        bootstrap.new_socket_channel(host_name, port, socket_options, events)
    }

    fn new_tls_socket_channel(
        &self,
        bootstrap: &Arc<dyn ClientBootstrap>,
        host_name: &str,
        port: u16,
        socket_options: &SocketOptions,
        tls_options: &TlsOptions,
        events: Arc<dyn ChannelEvents>,
    ) -> io::Result<()> {
        bootstrap.new_tls_socket_channel(host_name, port, socket_options, tls_options, events)
    }
}

static DEFAULT_DIALER: LazyLock<RwLock<Arc<dyn Dialer>>> =
    LazyLock::new(|| RwLock::new(Arc::new(SystemDialer)));

/// Replace the process-wide default dialer. Intended for test setup before
/// the system under test starts; there is no synchronization with dials
/// already in flight.
pub fn set_default_dialer(dialer: Arc<dyn Dialer>) {
    *DEFAULT_DIALER.write() = dialer;
}

pub(crate) fn default_dialer() -> Arc<dyn Dialer> {
    DEFAULT_DIALER.read().clone()
}
