//! Client connect path.
//!
//! `client_connect` validates the options, hands the dial to the configured
//! [`Dialer`], and parks an ephemeral connect record as the dial's event
//! sink. The record guarantees exactly-once user notification: either
//! `on_setup` with a failure, or `on_setup` with a connection followed by
//! exactly one `on_shutdown`. The shutdown callback is the single sink for
//! every failure that happens after the dial is queued, including stage
//! installation failures during setup.

use std::sync::Arc;

use channel_io::{Channel, ChannelEvents, ClientBootstrap, ErrorCode, SocketOptions, TlsOptions};
use parking_lot::Mutex;
use tracing::{error, info, trace};

use crate::connection::{Connection, install};
use crate::dialer::{Dialer, default_dialer};
use crate::error::HttpError;
use crate::metrics;
use crate::proxy::{ProxyOptions, ProxyRequestTransform};
use crate::subject;

/// Invoked exactly once per connect attempt with the established connection
/// or the reason it could not be established.
pub type OnClientSetup = Box<dyn FnOnce(Result<Connection, HttpError>) + Send>;

/// Invoked exactly once after a successful setup, when the connection has
/// finished shutting down.
pub type OnClientShutdown = Box<dyn FnOnce(&Connection, Result<(), HttpError>) + Send>;

/// Options for [`client_connect`].
pub struct ClientConnectionOptions {
    pub bootstrap: Arc<dyn ClientBootstrap>,
    pub host_name: String,
    pub port: u16,
    pub socket_options: SocketOptions,
    /// Dial with TLS when set; the negotiated ALPN protocol then picks the
    /// HTTP version.
    pub tls_options: Option<TlsOptions>,
    pub initial_window_size: usize,
    pub on_setup: OnClientSetup,
    pub on_shutdown: Option<OnClientShutdown>,
    /// Route the connection through a forward proxy.
    pub proxy_options: Option<ProxyOptions>,
    /// Request rewrite carried onto the connection for the stream layer.
    /// Set by the proxy connect path; callers normally leave it `None`.
    pub proxy_request_transform: Option<ProxyRequestTransform>,
    /// Dial capability override. `None` uses the process-wide default.
    pub dialer: Option<Arc<dyn Dialer>>,
}

/// Asynchronously establish a client connection.
///
/// A synchronous `Err` means nothing was started and no callback will fire.
/// After `Ok`, the outcome arrives through `on_setup` (and `on_shutdown`,
/// if setup succeeded).
pub fn client_connect(options: ClientConnectionOptions) -> Result<(), HttpError> {
    crate::fatal_assert_library_initialized();

    if options.proxy_options.is_some() {
        crate::proxy::connect_via_proxy(options)
    } else {
        connect_internal(options)
    }
}

pub(crate) fn connect_internal(options: ClientConnectionOptions) -> Result<(), HttpError> {
    debug_assert!(options.proxy_options.is_none());

    if options.host_name.is_empty() {
        error!(
            target: subject::CONNECTION,
            "invalid options, cannot create client connection"
        );
        return Err(HttpError::InvalidArgument);
    }

    let record = Arc::new(ClientConnectRecord::new(
        options.tls_options.is_some(),
        options.initial_window_size,
        options.on_setup,
        options.on_shutdown,
        options.proxy_request_transform,
    ));

    trace!(
        target: subject::CONNECTION,
        host = %options.host_name,
        port = options.port,
        tls = options.tls_options.is_some(),
        "initializing a new client channel"
    );

    let dialer = options.dialer.unwrap_or_else(default_dialer);
    let events: Arc<dyn ChannelEvents> = record;
    let result = match &options.tls_options {
        Some(tls_options) => dialer.new_tls_socket_channel(
            &options.bootstrap,
            &options.host_name,
            options.port,
            &options.socket_options,
            tls_options,
            events,
        ),
        None => dialer.new_socket_channel(
            &options.bootstrap,
            &options.host_name,
            options.port,
            &options.socket_options,
            events,
        ),
    };

    if let Err(e) = result {
        error!(
            target: subject::CONNECTION,
            error = %e,
            "failed to initiate socket channel for new client connection"
        );
        return Err(e.into());
    }

    Ok(())
}

/// Ephemeral per-connect record. Lives as the dial's event sink from the
/// moment the dial is queued until the shutdown callback has run (or setup
/// failed without a channel); freed when the transport drops its reference.
struct ClientConnectRecord {
    is_using_tls: bool,
    initial_window_size: usize,
    /// Taken when the user is notified of setup; `Some` here means the user
    /// has not heard about this connection yet.
    on_setup: Mutex<Option<OnClientSetup>>,
    on_shutdown: Mutex<Option<OnClientShutdown>>,
    request_transform: Option<ProxyRequestTransform>,
    connection: Mutex<Option<Connection>>,
}

impl ClientConnectRecord {
    fn new(
        is_using_tls: bool,
        initial_window_size: usize,
        on_setup: OnClientSetup,
        on_shutdown: Option<OnClientShutdown>,
        request_transform: Option<ProxyRequestTransform>,
    ) -> ClientConnectRecord {
        metrics::CLIENT_CONNECTS_IN_FLIGHT.increment();
        ClientConnectRecord {
            is_using_tls,
            initial_window_size,
            on_setup: Mutex::new(Some(on_setup)),
            on_shutdown: Mutex::new(on_shutdown),
            request_transform,
            connection: Mutex::new(None),
        }
    }
}

impl Drop for ClientConnectRecord {
    fn drop(&mut self) {
        metrics::CLIENT_CONNECTS_IN_FLIGHT.decrement();
    }
}

impl ChannelEvents for ClientConnectRecord {
    fn on_setup(&self, result: Result<Arc<dyn Channel>, ErrorCode>) {
        let channel = match result {
            Err(error_code) => {
                error!(
                    target: subject::CONNECTION,
                    error_code,
                    "client connection failed"
                );
                // No channel exists, so no shutdown callback will fire;
                // tell the user here.
                let on_setup = self.on_setup.lock().take();
                if let Some(on_setup) = on_setup {
                    on_setup(Err(HttpError::from_code(error_code)));
                }
                return;
            }
            Ok(channel) => channel,
        };

        trace!(
            target: subject::CONNECTION,
            channel = %channel.id(),
            "socket connected, creating client connection object"
        );

        let connection = match install(&channel, false, self.is_using_tls, self.initial_window_size)
        {
            Ok(connection) => connection,
            Err(e) => {
                error!(
                    target: subject::CONNECTION,
                    channel = %channel.id(),
                    error = %e,
                    "failed to create the client connection object"
                );
                // Wait for channel shutdown to deliver the failure before
                // the record goes away.
                channel.shutdown(e.code());
                return;
            }
        };

        if let Some(transform) = &self.request_transform {
            connection.set_request_transform(transform.clone());
        }

        info!(
            target: subject::CONNECTION,
            channel = %channel.id(),
            version = %connection.version(),
            "client connection established"
        );

        *self.connection.lock() = Some(connection.clone_handle());

        let on_setup = self.on_setup.lock().take();
        if let Some(on_setup) = on_setup {
            on_setup(Ok(connection));
        }
    }

    fn on_shutdown(&self, channel: &Arc<dyn Channel>, error_code: ErrorCode) {
        let pending_setup = self.on_setup.lock().take();
        if let Some(on_setup) = pending_setup {
            // Setup never reached the user; deliver the failure, and make
            // sure it carries a non-zero code.
            let error = if error_code == 0 {
                HttpError::Unknown
            } else {
                HttpError::from_code(error_code)
            };
            error!(
                target: subject::CONNECTION,
                channel = %channel.id(),
                error = %error,
                "client setup failed"
            );
            on_setup(Err(error));
            return;
        }

        let on_shutdown = self.on_shutdown.lock().take();
        if let Some(on_shutdown) = on_shutdown {
            let connection = self.connection.lock().as_ref().map(|c| c.clone_handle());
            if let Some(connection) = connection {
                info!(
                    target: subject::CONNECTION,
                    channel = %channel.id(),
                    error_code,
                    "client shutdown completed"
                );
                let result = if error_code == 0 {
                    Ok(())
                } else {
                    Err(HttpError::from_code(error_code))
                };
                on_shutdown(&connection, result);
            }
        }
    }
}
