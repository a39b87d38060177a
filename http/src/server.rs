//! Server listener and the accept path.
//!
//! The server owns the listening socket and tracks every accepted
//! connection in a synchronized map keyed by channel id. The map, the
//! shutdown flag, and the socket handle form the only state touched from
//! multiple threads; every access goes through one mutex, and the mutex is
//! never held across a user callback (a user calling back into
//! [`Server::release`] from a shutdown callback must not deadlock).

use std::collections::HashMap;
use std::sync::Arc;

use ahash::RandomState;
use channel_io::{
    AcceptEvents, Channel, ChannelId, Endpoint, ErrorCode, ListenerSocket, ServerBootstrap,
    SocketOptions, TlsOptions,
};
use parking_lot::Mutex;
use tracing::{error, info, trace};

use crate::connection::{Connection, install};
use crate::error::HttpError;
use crate::metrics;
use crate::subject;

/// Invoked on the event-loop thread once per accepted channel, with the new
/// connection or the reason the accept failed.
///
/// On success the callback must call
/// [`Connection::configure_server`](crate::Connection::configure_server)
/// before returning; an unconfigured connection is shut down with
/// [`HttpError::ReactionRequired`].
pub type OnIncomingConnection = Box<dyn Fn(Result<Connection, HttpError>) + Send + Sync>;

/// Invoked once the listener and every accepted channel have finished
/// tearing down. After this, the server does nothing further.
pub type OnServerDestroy = Box<dyn FnOnce() + Send>;

/// Options for [`Server::new`].
pub struct ServerOptions {
    pub bootstrap: Arc<dyn ServerBootstrap>,
    pub endpoint: Endpoint,
    pub socket_options: SocketOptions,
    /// Listen with TLS when set; accepted channels then resolve their HTTP
    /// version from ALPN.
    pub tls_options: Option<TlsOptions>,
    pub initial_window_size: usize,
    pub on_incoming_connection: OnIncomingConnection,
    pub on_destroy_complete: Option<OnServerDestroy>,
}

/// Only reachable with the mutex held.
struct Synced {
    /// Monotonic: set once by [`Server::release`], never cleared.
    is_shutting_down: bool,
    /// Accepted connections whose setup completed and whose shutdown has
    /// not yet fired. Entries are observers; the channel owns the
    /// connection.
    connections: HashMap<ChannelId, Connection, RandomState>,
    /// Populated under the lock during construction so accept callbacks
    /// never observe a half-initialized server.
    socket: Option<Arc<dyn ListenerSocket>>,
}

struct ServerInner {
    bootstrap: Arc<dyn ServerBootstrap>,
    is_using_tls: bool,
    initial_window_size: usize,
    on_incoming_connection: OnIncomingConnection,
    on_destroy_complete: Mutex<Option<OnServerDestroy>>,
    endpoint: Endpoint,
    synced: Mutex<Synced>,
}

impl Drop for ServerInner {
    fn drop(&mut self) {
        metrics::SERVERS_ACTIVE.decrement();
    }
}

/// A listening HTTP server.
///
/// Dropping the handle does not stop the server; call [`Server::release`]
/// to begin teardown and wait for `on_destroy_complete`.
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    /// Bind the listener and start accepting connections.
    pub fn new(options: ServerOptions) -> Result<Server, HttpError> {
        crate::fatal_assert_library_initialized();

        let is_using_tls = options.tls_options.is_some();
        metrics::SERVERS_ACTIVE.increment();
        let inner = Arc::new(ServerInner {
            bootstrap: options.bootstrap.clone(),
            is_using_tls,
            initial_window_size: options.initial_window_size,
            on_incoming_connection: options.on_incoming_connection,
            on_destroy_complete: Mutex::new(options.on_destroy_complete),
            endpoint: options.endpoint.clone(),
            synced: Mutex::new(Synced {
                is_shutting_down: false,
                connections: HashMap::with_hasher(RandomState::new()),
                socket: None,
            }),
        });

        // The bootstrap promises no accept callback before the listener
        // call returns; taking the lock across it is defense in depth for
        // the socket field.
        {
            let mut synced = inner.synced.lock();
            let events: Arc<dyn AcceptEvents> = inner.clone();
            let socket = match &options.tls_options {
                Some(tls_options) => options.bootstrap.new_tls_socket_listener(
                    &options.endpoint,
                    &options.socket_options,
                    tls_options,
                    events,
                ),
                None => options.bootstrap.new_socket_listener(
                    &options.endpoint,
                    &options.socket_options,
                    events,
                ),
            };
            match socket {
                Ok(socket) => synced.socket = Some(socket),
                Err(e) => {
                    drop(synced);
                    error!(
                        target: subject::SERVER,
                        endpoint = %options.endpoint,
                        error = %e,
                        "failed creating new socket listener, cannot create server"
                    );
                    return Err(e.into());
                }
            }
        }

        info!(
            target: subject::SERVER,
            endpoint = %options.endpoint,
            tls = is_using_tls,
            "server setup complete, listening for incoming connections"
        );

        Ok(Server { inner })
    }

    /// The address the server is listening on.
    pub fn endpoint(&self) -> Endpoint {
        self.inner.endpoint.clone()
    }

    /// Begin graceful teardown: stop accepting, shut every live connection
    /// down with [`HttpError::ConnectionClosed`], and destroy the listener.
    /// Returns immediately; completion is signaled via
    /// `on_destroy_complete`. Idempotent.
    pub fn release(&self) {
        let socket = {
            let mut synced = self.inner.synced.lock();
            if synced.is_shutting_down {
                None
            } else {
                synced.is_shutting_down = true;
                for connection in synced.connections.values() {
                    connection
                        .channel()
                        .shutdown(HttpError::ConnectionClosed.code());
                }
                synced.socket.clone()
            }
        };

        let Some(socket) = socket else {
            trace!(
                target: subject::SERVER,
                endpoint = %self.inner.endpoint,
                "the server is already shutting down"
            );
            return;
        };

        info!(
            target: subject::SERVER,
            endpoint = %self.inner.endpoint,
            "shutting down the server"
        );

        // Existing connections drain first; the listener-destroy callback
        // then finishes the teardown.
        self.inner.bootstrap.destroy_socket_listener(&socket);
    }
}

impl ServerInner {
    fn handle_accept(&self, channel: Arc<dyn Channel>) {
        let mut user_cb_invoked = false;
        let mut connection: Option<Connection> = None;

        let failure: Option<HttpError> = 'setup: {
            let new_connection = match install(
                &channel,
                true,
                self.is_using_tls,
                self.initial_window_size,
            ) {
                Ok(connection) => connection,
                Err(e) => {
                    error!(
                        target: subject::SERVER,
                        endpoint = %self.endpoint,
                        channel = %channel.id(),
                        error = %e,
                        "failed to create connection object"
                    );
                    break 'setup Some(e);
                }
            };
            let for_user = new_connection.clone_handle();
            let for_map = new_connection.clone_handle();
            connection = Some(new_connection);

            let shutting_down = {
                let mut synced = self.synced.lock();
                if synced.is_shutting_down {
                    true
                } else {
                    synced.connections.insert(channel.id(), for_map);
                    false
                }
            };
            if shutting_down {
                error!(
                    target: subject::SERVER,
                    endpoint = %self.endpoint,
                    channel = %channel.id(),
                    "incoming connection failed, the server is shutting down"
                );
                break 'setup Some(HttpError::ConnectionClosed);
            }

            info!(
                target: subject::CONNECTION,
                channel = %channel.id(),
                version = %for_user.version(),
                endpoint = %self.endpoint,
                "server connection established"
            );

            (self.on_incoming_connection)(Ok(for_user));
            user_cb_invoked = true;

            // The user had one chance to wire up request handling.
            if !connection.as_ref().is_some_and(|c| c.server_configured()) {
                error!(
                    target: subject::CONNECTION,
                    channel = %channel.id(),
                    "caller failed to invoke configure_server() during the \
                     incoming-connection callback, closing connection"
                );
                break 'setup Some(HttpError::ReactionRequired);
            }
            None
        };

        if let Some(e) = failure {
            if !user_cb_invoked {
                (self.on_incoming_connection)(Err(e));
            }
            channel.shutdown(e.code());
            if let Some(connection) = connection {
                // The user-side refcount; nobody else will drop it.
                connection.release();
            }
        }
    }
}

impl AcceptEvents for ServerInner {
    fn on_accept_setup(&self, result: Result<Arc<dyn Channel>, ErrorCode>) {
        match result {
            Ok(channel) => self.handle_accept(channel),
            Err(error_code) => {
                error!(
                    target: subject::SERVER,
                    endpoint = %self.endpoint,
                    error_code,
                    "incoming connection failed"
                );
                (self.on_incoming_connection)(Err(HttpError::from_code(error_code)));
            }
        }
    }

    fn on_accept_shutdown(&self, channel: &Arc<dyn Channel>, error_code: ErrorCode) {
        // Absent from the map if something went wrong while setting the
        // connection up.
        let connection = { self.synced.lock().connections.remove(&channel.id()) };

        if let Some(connection) = connection {
            info!(
                target: subject::CONNECTION,
                channel = %channel.id(),
                error_code,
                "server connection shut down"
            );
            if let Some(on_shutdown) = connection.take_server_shutdown() {
                let result = if error_code == 0 {
                    Ok(())
                } else {
                    Err(HttpError::from_code(error_code))
                };
                on_shutdown(&connection, result);
            }
        }
    }

    fn on_listener_destroy(&self) {
        info!(
            target: subject::SERVER,
            endpoint = %self.endpoint,
            "server listener destroyed, teardown complete"
        );
        let on_destroy_complete = self.on_destroy_complete.lock().take();
        if let Some(on_destroy_complete) = on_destroy_complete {
            on_destroy_complete();
        }
    }
}
