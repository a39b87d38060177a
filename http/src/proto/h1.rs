//! HTTP/1.1 connection lifecycle state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use channel_io::{Channel, ErrorCode};
use tracing::trace;

use crate::subject;

pub(crate) struct H1Conn {
    channel: Arc<dyn Channel>,
    open: AtomicBool,
    /// Read window advertised to the peer by the stream layer.
    recv_window: AtomicUsize,
}

impl H1Conn {
    pub fn new(channel: Arc<dyn Channel>, initial_window_size: usize) -> H1Conn {
        H1Conn {
            channel,
            open: AtomicBool::new(true),
            recv_window: AtomicUsize::new(initial_window_size),
        }
    }

    /// Close the connection by shutting the channel down. Idempotent; the
    /// channel tears down asynchronously.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            trace!(
                target: subject::CONNECTION,
                channel = %self.channel.id(),
                "closing HTTP/1.1 connection"
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
        self.recv_window.fetch_add(increment, Ordering::AcqRel);
        trace!(
            target: subject::CONNECTION,
            channel = %self.channel.id(),
            increment,
            "read window incremented"
        );
    }

    pub fn on_channel_shutdown(&self, error_code: ErrorCode) {
        self.open.store(false, Ordering::Release);
        trace!(
            target: subject::CONNECTION,
            channel = %self.channel.id(),
            error_code,
            "channel shutdown reached HTTP/1.1 connection"
        );
    }
}
