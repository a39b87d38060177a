//! HTTP/2 connection lifecycle state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use channel_io::{Channel, ErrorCode};
use tracing::trace;

use crate::subject;

pub(crate) struct H2Conn {
    channel: Arc<dyn Channel>,
    open: AtomicBool,
    /// Connection-level flow-control window credited to the peer.
    connection_window: AtomicI64,
}

impl H2Conn {
    pub fn new(channel: Arc<dyn Channel>, initial_window_size: usize) -> H2Conn {
        H2Conn {
            channel,
            open: AtomicBool::new(true),
            connection_window: AtomicI64::new(initial_window_size as i64),
        }
    }

    /// Close the connection. The GOAWAY exchange belongs to the frame
    /// layer; the lifecycle layer's close is a channel shutdown.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            trace!(
                target: subject::CONNECTION,
                channel = %self.channel.id(),
                "closing HTTP/2 connection"
            );
            self.channel.shutdown(channel_io::OK);
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn update_window(&self, increment: usize) {
        if increment == 0 {
            return;
        }
        self.connection_window
            .fetch_add(increment as i64, Ordering::AcqRel);
        trace!(
            target: subject::CONNECTION,
            channel = %self.channel.id(),
            increment,
            "connection flow-control window incremented"
        );
    }

    pub fn on_channel_shutdown(&self, error_code: ErrorCode) {
        self.open.store(false, Ordering::Release);
        trace!(
            target: subject::CONNECTION,
            channel = %self.channel.id(),
            error_code,
            "channel shutdown reached HTTP/2 connection"
        );
    }
}
