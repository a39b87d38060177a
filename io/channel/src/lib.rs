//! channel-io - byte-channel pipeline interfaces.
//!
//! A *channel* is an ordered pipeline of processing stages pinned to a single
//! event-loop thread. Bytes and events flow through the stages in both
//! directions; each stage binds one handler. This crate defines the traits a
//! protocol layer codes against, plus the bootstrap factories that dial or
//! listen and produce channels. The event-loop runtime that drives real
//! channels lives elsewhere; the `testing` module (behind the `testing`
//! feature) provides deterministic in-memory stand-ins.
//!
//! # Lifetime protocol
//!
//! A channel owns its stages, and each stage owns its handler. Anything that
//! must outlive a stage takes a *hold* on the channel
//! ([`Channel::acquire_hold`]); the channel defers destruction until every
//! hold is released. Shutdown is asynchronous: [`Channel::shutdown`] records
//! a result code (first caller wins) and the runtime later walks the stages,
//! fires the registered shutdown callback, and destroys the pipeline once
//! the hold count reaches zero.

mod bootstrap;
mod socket;
mod tls;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use bootstrap::{
    AcceptEvents, ChannelEvents, ClientBootstrap, Endpoint, ListenerSocket, ServerBootstrap,
};
pub use socket::SocketOptions;
pub use tls::TlsOptions;

use std::io;
use std::sync::Arc;

use bytes::Bytes;

/// Identifies a channel for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u64);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one stage within a channel's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageId(pub u64);

/// Result code delivered with shutdown notifications. Zero is a clean
/// shutdown; any other value is an error code from the owning layer's
/// namespace.
pub type ErrorCode = u32;

/// A clean shutdown.
pub const OK: ErrorCode = 0;

/// The per-stage object that processes inbound and outbound events.
///
/// Handlers are held behind `Arc` because the channel owns them for the life
/// of their stage while other layers may need to query them (for example the
/// ALPN lookup against an upstream TLS handler).
pub trait ChannelHandler: Send + Sync {
    /// The application protocol negotiated during this handler's handshake.
    ///
    /// Only meaningful for handlers that perform TLS; the default reports
    /// no negotiation. An empty byte sequence means the handshake completed
    /// without agreeing on a protocol.
    fn negotiated_protocol(&self) -> Option<Bytes> {
        None
    }

    /// Channel shutdown has propagated to this handler's stage.
    fn on_channel_shutdown(&self, _error_code: ErrorCode) {}
}

/// An ordered pipeline of processing stages bound to one event-loop thread.
///
/// All methods are non-blocking. Stage mutation is only valid from the
/// channel's event-loop thread or before the channel starts processing;
/// `shutdown`, `acquire_hold`, and `release_hold` may be called from any
/// thread.
pub trait Channel: Send + Sync {
    /// Process-unique channel identity, usable as a map key.
    fn id(&self) -> ChannelId;

    /// Allocate a new stage. The stage is not part of the pipeline until
    /// linked with [`Channel::insert_stage_end`].
    fn new_stage(&self) -> io::Result<StageId>;

    /// Link a stage at the downstream end of the pipeline.
    fn insert_stage_end(&self, stage: StageId) -> io::Result<()>;

    /// Bind a handler to a stage.
    fn set_stage_handler(&self, stage: StageId, handler: Arc<dyn ChannelHandler>)
    -> io::Result<()>;

    /// Unlink a stage and drop its handler, if any.
    fn remove_stage(&self, stage: StageId);

    /// The handler of the stage immediately upstream of `stage`, or `None`
    /// if there is no upstream stage or it has no handler bound.
    fn upstream_handler(&self, stage: StageId) -> Option<Arc<dyn ChannelHandler>>;

    /// Prevent the channel from being destroyed until a matching
    /// [`Channel::release_hold`].
    fn acquire_hold(&self);

    /// Release one hold. Once shutdown has completed and the hold count is
    /// zero the runtime destroys the pipeline, dropping every handler.
    fn release_hold(&self);

    /// Request asynchronous shutdown with the given result code. Idempotent;
    /// the first recorded code is the one delivered to shutdown callbacks.
    fn shutdown(&self, error_code: ErrorCode);
}
