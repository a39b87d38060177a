//! HTTP error namespace.
//!
//! Codes in the `0x0800..0x0C00` range are reserved for HTTP errors and are
//! stable across releases within a major version. Codes below the range
//! cover argument and state errors raised synchronously at entry points;
//! transport failures carry the transport's own code through unchanged.

use std::io;

use thiserror::Error;

/// First code in the reserved HTTP range.
pub const HTTP_ERROR_CODE_BEGIN: u32 = 0x0800;
/// One past the last code in the reserved HTTP range.
pub const HTTP_ERROR_CODE_END: u32 = 0x0C00;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HttpError {
    #[error("unknown error")]
    Unknown,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("operation invalid for the object's current state")]
    InvalidState,
    /// A failure surfaced by the transport layer, carrying its code.
    #[error("transport failure (code {0})")]
    Transport(u32),

    #[error("a required header was not found")]
    HeaderNotFound,
    #[error("invalid header field")]
    InvalidHeaderField,
    #[error("invalid header name")]
    InvalidHeaderName,
    #[error("invalid header value")]
    InvalidHeaderValue,
    #[error("invalid request method")]
    InvalidMethod,
    #[error("invalid request path")]
    InvalidPath,
    #[error("invalid response status code")]
    InvalidStatusCode,
    #[error("a body stream was required but not provided")]
    MissingBodyStream,
    #[error("body stream is invalid")]
    InvalidBodyStream,
    #[error("the connection has closed or is closing")]
    ConnectionClosed,
    #[error("the connection has switched protocols")]
    SwitchedProtocols,
    #[error("unsupported protocol")]
    UnsupportedProtocol,
    #[error("a callback must take action before the operation can proceed")]
    ReactionRequired,
    #[error("data not yet available")]
    DataNotAvailable,
    #[error("outgoing stream length differs from declared content length")]
    OutgoingStreamLengthIncorrect,
    #[error("a user callback reported failure")]
    CallbackFailure,
    #[error("websocket upgrade failed")]
    WebsocketUpgradeFailure,
    #[error("websocket close frame already sent")]
    WebsocketCloseFrameSent,
    #[error("websocket is installed as a midchannel handler")]
    WebsocketIsMidchannelHandler,
    #[error("connection manager is in an invalid state for acquisition")]
    ConnectionManagerInvalidStateForAcquire,
    #[error("connection manager vended-connection count underflowed")]
    ConnectionManagerVendedConnectionUnderflow,
    #[error("the server is closed")]
    ServerClosed,
    #[error("TLS connection to proxy failed")]
    ProxyTlsConnectFailed,
    #[error("connection manager is shutting down")]
    ConnectionManagerShuttingDown,
    #[error("HTTP protocol violation")]
    ProtocolError,
    #[error("the stream has closed")]
    StreamClosed,
    #[error("frame size is invalid")]
    InvalidFrameSize,
}

impl HttpError {
    /// The stable numeric code for this error.
    pub fn code(&self) -> u32 {
        use HttpError::*;
        match self {
            Unknown => 1,
            InvalidArgument => 2,
            InvalidState => 3,
            Transport(code) => *code,
            HeaderNotFound => 0x0800,
            InvalidHeaderField => 0x0801,
            InvalidHeaderName => 0x0802,
            InvalidHeaderValue => 0x0803,
            InvalidMethod => 0x0804,
            InvalidPath => 0x0805,
            InvalidStatusCode => 0x0806,
            MissingBodyStream => 0x0807,
            InvalidBodyStream => 0x0808,
            ConnectionClosed => 0x0809,
            SwitchedProtocols => 0x080a,
            UnsupportedProtocol => 0x080b,
            ReactionRequired => 0x080c,
            DataNotAvailable => 0x080d,
            OutgoingStreamLengthIncorrect => 0x080e,
            CallbackFailure => 0x080f,
            WebsocketUpgradeFailure => 0x0810,
            WebsocketCloseFrameSent => 0x0811,
            WebsocketIsMidchannelHandler => 0x0812,
            ConnectionManagerInvalidStateForAcquire => 0x0813,
            ConnectionManagerVendedConnectionUnderflow => 0x0814,
            ServerClosed => 0x0815,
            ProxyTlsConnectFailed => 0x0816,
            ConnectionManagerShuttingDown => 0x0817,
            ProtocolError => 0x0818,
            StreamClosed => 0x0819,
            InvalidFrameSize => 0x081a,
        }
    }

    /// Recover an error from a non-zero wire code. Codes outside the known
    /// namespaces come back as [`HttpError::Transport`].
    pub fn from_code(code: u32) -> HttpError {
        use HttpError::*;
        debug_assert!(code != 0, "zero is not an error code");
        match code {
            1 => Unknown,
            2 => InvalidArgument,
            3 => InvalidState,
            0x0800 => HeaderNotFound,
            0x0801 => InvalidHeaderField,
            0x0802 => InvalidHeaderName,
            0x0803 => InvalidHeaderValue,
            0x0804 => InvalidMethod,
            0x0805 => InvalidPath,
            0x0806 => InvalidStatusCode,
            0x0807 => MissingBodyStream,
            0x0808 => InvalidBodyStream,
            0x0809 => ConnectionClosed,
            0x080a => SwitchedProtocols,
            0x080b => UnsupportedProtocol,
            0x080c => ReactionRequired,
            0x080d => DataNotAvailable,
            0x080e => OutgoingStreamLengthIncorrect,
            0x080f => CallbackFailure,
            0x0810 => WebsocketUpgradeFailure,
            0x0811 => WebsocketCloseFrameSent,
            0x0812 => WebsocketIsMidchannelHandler,
            0x0813 => ConnectionManagerInvalidStateForAcquire,
            0x0814 => ConnectionManagerVendedConnectionUnderflow,
            0x0815 => ServerClosed,
            0x0816 => ProxyTlsConnectFailed,
            0x0817 => ConnectionManagerShuttingDown,
            0x0818 => ProtocolError,
            0x0819 => StreamClosed,
            0x081a => InvalidFrameSize,
            other => Transport(other),
        }
    }
}

impl From<io::Error> for HttpError {
    fn from(e: io::Error) -> Self {
        match e.raw_os_error() {
            Some(errno) if errno > 0 => HttpError::Transport(errno as u32),
            _ => HttpError::Unknown,
        }
    }
}
