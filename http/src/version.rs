//! HTTP version tags and the ALPN-driven version dispatch.

use std::sync::Arc;

use channel_io::{Channel, StageId};
use tracing::warn;

use crate::error::HttpError;
use crate::subject;

/// ALPN identifier for HTTP/1.1.
pub const ALPN_HTTP_1_1: &[u8] = b"http/1.1";
/// ALPN identifier for HTTP/2.
pub const ALPN_H2: &[u8] = b"h2";

/// Protocol version spoken on a connection. Fixed at connection setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Unknown,
    Http1_0,
    Http1_1,
    Http2,
}

impl HttpVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVersion::Unknown => "Unknown",
            HttpVersion::Http1_0 => "HTTP/1.0",
            HttpVersion::Http1_1 => "HTTP/1.1",
            HttpVersion::Http2 => "HTTP/2",
        }
    }
}

impl std::fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decide the HTTP version for a freshly inserted connection stage.
///
/// Plaintext channels default to HTTP/1.1. On TLS channels the stage
/// immediately upstream must be the TLS handler; its negotiated ALPN
/// protocol picks the version. An empty or unrecognized negotiation result
/// degrades to HTTP/1.1 rather than failing the connection.
pub(crate) fn negotiated_version(
    channel: &Arc<dyn Channel>,
    stage: StageId,
    is_using_tls: bool,
) -> Result<HttpVersion, HttpError> {
    if !is_using_tls {
        return Ok(HttpVersion::Http1_1);
    }

    // ALPN output only exists after the handshake, which the transport has
    // finished by the time setup callbacks run.
    let Some(tls_handler) = channel.upstream_handler(stage) else {
        tracing::error!(
            target: subject::CONNECTION,
            channel = %channel.id(),
            "failed to find TLS handler in channel"
        );
        return Err(HttpError::InvalidState);
    };

    let protocol = tls_handler.negotiated_protocol().unwrap_or_default();
    match protocol.as_ref() {
        p if p == ALPN_HTTP_1_1 => Ok(HttpVersion::Http1_1),
        p if p == ALPN_H2 => Ok(HttpVersion::Http2),
        other => {
            crate::metrics::ALPN_FALLBACKS.increment();
            warn!(
                target: subject::CONNECTION,
                channel = %channel.id(),
                protocol = ?String::from_utf8_lossy(other),
                "unrecognized ALPN protocol, assuming HTTP/1.1"
            );
            Ok(HttpVersion::Http1_1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use channel_io::testing::TestChannel;

    fn stage_on(channel: &Arc<TestChannel>) -> StageId {
        let stage = channel.new_stage().unwrap();
        channel.insert_stage_end(stage).unwrap();
        stage
    }

    #[test]
    fn plaintext_defaults_to_http1_1() {
        let channel = TestChannel::new();
        let stage = stage_on(&channel);
        let version = negotiated_version(&channel.as_channel(), stage, false).unwrap();
        assert_eq!(version, HttpVersion::Http1_1);
    }

    #[test]
    fn alpn_http1_1_resolves() {
        let channel = TestChannel::with_tls(b"http/1.1");
        let stage = stage_on(&channel);
        let version = negotiated_version(&channel.as_channel(), stage, true).unwrap();
        assert_eq!(version, HttpVersion::Http1_1);
    }

    #[test]
    fn alpn_h2_resolves() {
        let channel = TestChannel::with_tls(b"h2");
        let stage = stage_on(&channel);
        let version = negotiated_version(&channel.as_channel(), stage, true).unwrap();
        assert_eq!(version, HttpVersion::Http2);
    }

    #[test]
    fn empty_alpn_falls_back_to_http1_1() {
        let channel = TestChannel::with_tls(b"");
        let stage = stage_on(&channel);
        let before = crate::metrics::ALPN_FALLBACKS.value();
        let version = negotiated_version(&channel.as_channel(), stage, true).unwrap();
        assert_eq!(version, HttpVersion::Http1_1);
        assert!(crate::metrics::ALPN_FALLBACKS.value() > before);
    }

    #[test]
    fn unrecognized_alpn_falls_back_to_http1_1() {
        let channel = TestChannel::with_tls(b"spdy/3");
        let stage = stage_on(&channel);
        let version = negotiated_version(&channel.as_channel(), stage, true).unwrap();
        assert_eq!(version, HttpVersion::Http1_1);
    }

    #[test]
    fn tls_without_upstream_handler_is_invalid_state() {
        let channel = TestChannel::new();
        let stage = stage_on(&channel);
        let result = negotiated_version(&channel.as_channel(), stage, true);
        assert_eq!(result.unwrap_err(), HttpError::InvalidState);
    }
}
