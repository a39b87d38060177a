//! Protocol variants behind the connection façade.
//!
//! The façade dispatches `close`/`is_open`/`update_window` to whichever
//! variant the version dispatch selected at setup. Frame and message
//! handling live with the protocol implementations outside this crate; the
//! variants here carry the per-connection lifecycle state those
//! implementations hang off of.

pub(crate) mod h1;
#[cfg(feature = "http2")]
pub(crate) mod h2;

use std::sync::Arc;

use channel_io::{Channel, ErrorCode};
use tracing::error;

use crate::error::HttpError;
use crate::subject;
use crate::version::HttpVersion;

pub(crate) enum ProtoConn {
    H1(h1::H1Conn),
    #[cfg(feature = "http2")]
    H2(h2::H2Conn),
}

impl ProtoConn {
    /// Construct the variant for a resolved version.
    ///
    /// Panics if `Http2` is requested in a build without the `http2`
    /// feature; that is a build mismatch, not a runtime condition.
    pub fn new(
        version: HttpVersion,
        channel: Arc<dyn Channel>,
        initial_window_size: usize,
    ) -> Result<ProtoConn, HttpError> {
        match version {
            HttpVersion::Http1_1 => {
                Ok(ProtoConn::H1(h1::H1Conn::new(channel, initial_window_size)))
            }
            HttpVersion::Http2 => Self::new_h2(channel, initial_window_size),
            other => {
                error!(
                    target: subject::CONNECTION,
                    version = %other,
                    "unsupported version"
                );
                Err(HttpError::UnsupportedProtocol)
            }
        }
    }

    #[cfg(feature = "http2")]
    fn new_h2(channel: Arc<dyn Channel>, initial_window_size: usize) -> Result<ProtoConn, HttpError> {
        Ok(ProtoConn::H2(h2::H2Conn::new(channel, initial_window_size)))
    }

    #[cfg(not(feature = "http2"))]
    fn new_h2(_channel: Arc<dyn Channel>, _initial_window_size: usize) -> Result<ProtoConn, HttpError> {
        panic!("negotiated HTTP/2 but the http2 feature is not compiled in");
    }

    pub fn close(&self) {
        match self {
            ProtoConn::H1(conn) => conn.close(),
            #[cfg(feature = "http2")]
            ProtoConn::H2(conn) => conn.close(),
        }
    }

    pub fn is_open(&self) -> bool {
        match self {
            ProtoConn::H1(conn) => conn.is_open(),
            #[cfg(feature = "http2")]
            ProtoConn::H2(conn) => conn.is_open(),
        }
    }

    pub fn update_window(&self, increment: usize) {
        match self {
            ProtoConn::H1(conn) => conn.update_window(increment),
            #[cfg(feature = "http2")]
            ProtoConn::H2(conn) => conn.update_window(increment),
        }
    }

    pub fn on_channel_shutdown(&self, error_code: ErrorCode) {
        match self {
            ProtoConn::H1(conn) => conn.on_channel_shutdown(error_code),
            #[cfg(feature = "http2")]
            ProtoConn::H2(conn) => conn.on_channel_shutdown(error_code),
        }
    }
}
