//! The connection façade and its channel-stage installer.
//!
//! A connection is created during channel setup (client dial or server
//! accept), occupies the downstream end of the channel's pipeline, and is
//! destroyed by the channel when the pipeline is torn down. Three parties
//! keep it alive with asymmetric roles: the channel owns the storage (the
//! stage holds the handler), the user owns a logical refcount, and the
//! connection itself holds the channel open with a channel-hold. The cycle
//! breaks in [`Connection::release`]: dropping the last user refcount shuts
//! the channel down and releases the hold, which lets the channel destroy
//! its stages and with them the connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use channel_io::{Channel, ChannelHandler, ErrorCode, StageId};
use parking_lot::Mutex;
use tracing::{error, trace, warn};

use crate::error::HttpError;
use crate::metrics;
use crate::proto::ProtoConn;
use crate::proxy::ProxyRequestTransform;
use crate::subject;
use crate::version::{HttpVersion, negotiated_version};

/// Invoked for each request the peer initiates on a server connection.
pub type OnIncomingRequest = Arc<dyn Fn(&Connection) + Send + Sync>;

/// Invoked once when a connection finishes shutting down. A zero-cost
/// `Ok(())` is a clean shutdown.
pub type OnConnectionShutdown = Box<dyn FnOnce(&Connection, Result<(), HttpError>) + Send>;

/// Server-role configuration supplied through
/// [`Connection::configure_server`].
pub struct ServerConnectionOptions {
    pub on_incoming_request: OnIncomingRequest,
    pub on_shutdown: Option<OnConnectionShutdown>,
}

struct ClientData {
    /// Set when the connection was established through a proxy; consumed by
    /// the stream layer when writing requests.
    request_transform: Mutex<Option<ProxyRequestTransform>>,
}

struct ServerData {
    on_incoming_request: Mutex<Option<OnIncomingRequest>>,
    on_shutdown: Mutex<Option<OnConnectionShutdown>>,
}

/// Exactly one role is populated, fixed at construction.
enum RoleData {
    Client(ClientData),
    Server(ServerData),
}

pub(crate) struct ConnectionInner {
    version: HttpVersion,
    /// Logical user refcount, starts at 1. Distinct from the `Arc` count:
    /// reaching zero triggers channel shutdown and drops the channel-hold,
    /// while the storage lives until the channel destroys the stage.
    refcount: AtomicUsize,
    channel: Arc<dyn Channel>,
    stage: StageId,
    proto: ProtoConn,
    role: RoleData,
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        metrics::CONNECTIONS_ACTIVE.decrement();
    }
}

/// The embedded handler record: the pipeline stage points at the connection
/// itself.
impl ChannelHandler for ConnectionInner {
    fn negotiated_protocol(&self) -> Option<Bytes> {
        None
    }

    fn on_channel_shutdown(&self, error_code: ErrorCode) {
        trace!(
            target: subject::CONNECTION,
            channel = %self.channel.id(),
            stage = ?self.stage,
            error_code,
            "channel shutdown reached connection stage"
        );
        self.proto.on_channel_shutdown(error_code);
    }
}

/// Handle to an HTTP connection of either version and either role.
///
/// All operations are non-blocking and callable from any thread. The handle
/// carries no refcount of its own; interest in the connection is expressed
/// through [`Connection::acquire`] and [`Connection::release`].
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("version", &self.inner.version)
            .field("channel", &self.inner.channel.id())
            .field("server", &self.is_server())
            .field("open", &self.is_open())
            .finish()
    }
}

impl Connection {
    pub(crate) fn clone_handle(&self) -> Connection {
        Connection {
            inner: self.inner.clone(),
        }
    }

    /// Register one more unit of interest in the connection.
    ///
    /// Only valid while the caller already holds interest (the refcount is
    /// above zero).
    pub fn acquire(&self) {
        let prev = self.inner.refcount.fetch_add(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "acquire on a released connection");
    }

    /// Drop one unit of interest. When the last unit is dropped this shuts
    /// the channel down cleanly and releases the connection's channel-hold;
    /// the channel then destroys the connection along with the pipeline.
    ///
    /// Releasing more times than acquired is a fatal bug and panics.
    pub fn release(&self) {
        let prev = self.inner.refcount.fetch_sub(1, Ordering::AcqRel);
        assert!(prev > 0, "connection released more times than acquired");
        if prev == 1 {
            trace!(
                target: subject::CONNECTION,
                channel = %self.inner.channel.id(),
                "final connection refcount released, shutting down"
            );
            // Channel might already be shutting down, but make sure.
            self.inner.channel.shutdown(channel_io::OK);
            self.inner.channel.release_hold();
        } else {
            trace!(
                target: subject::CONNECTION,
                channel = %self.inner.channel.id(),
                remaining = prev - 1,
                "connection refcount released"
            );
        }
    }

    /// Begin an asynchronous, graceful close. Idempotent.
    pub fn close(&self) {
        self.inner.proto.close();
    }

    pub fn is_open(&self) -> bool {
        self.inner.proto.is_open()
    }

    pub fn version(&self) -> HttpVersion {
        self.inner.version
    }

    pub fn is_client(&self) -> bool {
        matches!(self.inner.role, RoleData::Client(_))
    }

    pub fn is_server(&self) -> bool {
        matches!(self.inner.role, RoleData::Server(_))
    }

    /// Advisory flow-control credit for the peer.
    pub fn update_window(&self, increment: usize) {
        self.inner.proto.update_window(increment);
    }

    /// The channel this connection lives on. Valid while the caller holds
    /// interest in the connection.
    pub fn channel(&self) -> Arc<dyn Channel> {
        self.inner.channel.clone()
    }

    /// Attach server-role callbacks. Must be called from the server's
    /// incoming-connection callback, exactly once per connection.
    ///
    /// Fails with [`HttpError::InvalidState`] on a client connection or if
    /// the connection is already configured.
    pub fn configure_server(&self, options: ServerConnectionOptions) -> Result<(), HttpError> {
        let server = match &self.inner.role {
            RoleData::Server(server) => server,
            RoleData::Client(_) => {
                warn!(
                    target: subject::CONNECTION,
                    channel = %self.inner.channel.id(),
                    "server-only function invoked on client connection, ignoring call"
                );
                return Err(HttpError::InvalidState);
            }
        };

        {
            let mut slot = server.on_incoming_request.lock();
            if slot.is_some() {
                warn!(
                    target: subject::CONNECTION,
                    channel = %self.inner.channel.id(),
                    "connection is already configured, ignoring call"
                );
                return Err(HttpError::InvalidState);
            }
            *slot = Some(options.on_incoming_request);
        }
        *server.on_shutdown.lock() = options.on_shutdown;
        Ok(())
    }

    pub(crate) fn set_request_transform(&self, transform: ProxyRequestTransform) {
        if let RoleData::Client(client) = &self.inner.role {
            *client.request_transform.lock() = Some(transform);
        }
    }

    /// The request transform installed by the proxy connect path, if any.
    pub fn request_transform(&self) -> Option<ProxyRequestTransform> {
        match &self.inner.role {
            RoleData::Client(client) => client.request_transform.lock().clone(),
            RoleData::Server(_) => None,
        }
    }

    /// Whether `configure_server` has run on this server connection.
    pub(crate) fn server_configured(&self) -> bool {
        match &self.inner.role {
            RoleData::Server(server) => server.on_incoming_request.lock().is_some(),
            RoleData::Client(_) => false,
        }
    }

    pub(crate) fn take_server_shutdown(&self) -> Option<OnConnectionShutdown> {
        match &self.inner.role {
            RoleData::Server(server) => server.on_shutdown.lock().take(),
            RoleData::Client(_) => None,
        }
    }
}

/// Determine the HTTP version, create the matching connection variant, and
/// splice it into the channel as the tail stage.
///
/// On failure every completed step unwinds in reverse; the channel-hold is
/// acquired last, so failure paths never leave a stray hold behind.
pub(crate) fn install(
    channel: &Arc<dyn Channel>,
    is_server: bool,
    is_using_tls: bool,
    initial_window_size: usize,
) -> Result<Connection, HttpError> {
    let stage = match channel.new_stage() {
        Ok(stage) => stage,
        Err(e) => {
            error!(
                target: subject::CONNECTION,
                channel = %channel.id(),
                error = %e,
                "failed to create stage in channel"
            );
            return Err(e.into());
        }
    };

    if let Err(e) = channel.insert_stage_end(stage) {
        error!(
            target: subject::CONNECTION,
            channel = %channel.id(),
            error = %e,
            "failed to insert stage into channel"
        );
        channel.remove_stage(stage);
        return Err(e.into());
    }

    let version = match negotiated_version(channel, stage, is_using_tls) {
        Ok(version) => version,
        Err(e) => {
            channel.remove_stage(stage);
            return Err(e);
        }
    };

    let proto = match ProtoConn::new(version, channel.clone(), initial_window_size) {
        Ok(proto) => proto,
        Err(e) => {
            channel.remove_stage(stage);
            return Err(e);
        }
    };

    metrics::CONNECTIONS_ACTIVE.increment();
    let inner = Arc::new(ConnectionInner {
        version,
        refcount: AtomicUsize::new(1),
        channel: channel.clone(),
        stage,
        proto,
        role: if is_server {
            RoleData::Server(ServerData {
                on_incoming_request: Mutex::new(None),
                on_shutdown: Mutex::new(None),
            })
        } else {
            RoleData::Client(ClientData {
                request_transform: Mutex::new(None),
            })
        },
    });

    if let Err(e) = channel.set_stage_handler(stage, inner.clone()) {
        error!(
            target: subject::CONNECTION,
            channel = %channel.id(),
            error = %e,
            "failed to bind HTTP handler to stage"
        );
        channel.remove_stage(stage);
        return Err(e.into());
    }

    // Hold the channel open until the user gives the go-ahead via release().
    channel.acquire_hold();
    metrics::CONNECTIONS_ESTABLISHED.increment();

    Ok(Connection { inner })
}
