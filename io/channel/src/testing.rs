//! Deterministic test doubles for channels and bootstraps.
//!
//! Real channels are driven by an event loop; these doubles are driven by
//! the test. A dial or accept is recorded, the test completes it with
//! [`TestClientBootstrap::complete_setup`] or [`TestListener::accept`], and
//! shutdown callbacks fire only when the test calls
//! [`TestChannel::drive_shutdown`]. Destruction follows the production
//! rules: shutdown delivered and hold count zero.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::{
    AcceptEvents, Channel, ChannelEvents, ChannelHandler, ChannelId, ClientBootstrap, Endpoint,
    ErrorCode, ListenerSocket, ServerBootstrap, SocketOptions, StageId, TlsOptions,
};

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

struct TestStage {
    id: StageId,
    handler: Option<Arc<dyn ChannelHandler>>,
}

#[derive(Clone)]
enum ShutdownSink {
    Client(Arc<dyn ChannelEvents>),
    Accept(Arc<dyn AcceptEvents>),
}

struct ChannelState {
    next_stage: u64,
    stages: Vec<TestStage>,
    /// Linked stages, upstream first.
    pipeline: Vec<StageId>,
    shutdown_code: Option<ErrorCode>,
    shutdown_delivered: bool,
    destroyed: bool,
    sink: Option<ShutdownSink>,
}

/// In-memory [`Channel`] with hand-cranked shutdown.
pub struct TestChannel {
    id: ChannelId,
    weak_self: Weak<TestChannel>,
    holds: AtomicUsize,
    fail_next_new_stage: AtomicBool,
    fail_next_set_handler: AtomicBool,
    state: Mutex<ChannelState>,
}

impl TestChannel {
    pub fn new() -> Arc<TestChannel> {
        Arc::new_cyclic(|weak| TestChannel {
            id: ChannelId(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed)),
            weak_self: weak.clone(),
            holds: AtomicUsize::new(0),
            fail_next_new_stage: AtomicBool::new(false),
            fail_next_set_handler: AtomicBool::new(false),
            state: Mutex::new(ChannelState {
                next_stage: 1,
                stages: Vec::new(),
                pipeline: Vec::new(),
                shutdown_code: None,
                shutdown_delivered: false,
                destroyed: false,
                sink: None,
            }),
        })
    }

    /// A channel whose pipeline already ends in a TLS stage that negotiated
    /// the given ALPN protocol.
    pub fn with_tls(alpn: &[u8]) -> Arc<TestChannel> {
        let channel = Self::new();
        let stage = channel.new_stage().unwrap();
        channel.insert_stage_end(stage).unwrap();
        channel
            .set_stage_handler(stage, Arc::new(TestTlsHandler::new(alpn)))
            .unwrap();
        channel
    }

    pub fn as_channel(self: &Arc<Self>) -> Arc<dyn Channel> {
        self.clone()
    }

    /// Route shutdown delivery to client dial callbacks.
    pub fn set_client_events(&self, events: Arc<dyn ChannelEvents>) {
        self.state.lock().sink = Some(ShutdownSink::Client(events));
    }

    /// Route shutdown delivery to server accept callbacks.
    pub fn set_accept_events(&self, events: Arc<dyn AcceptEvents>) {
        self.state.lock().sink = Some(ShutdownSink::Accept(events));
    }

    /// Make the next `new_stage` call fail.
    pub fn fail_next_new_stage(&self) {
        self.fail_next_new_stage.store(true, Ordering::Release);
    }

    /// Make the next `set_stage_handler` call fail.
    pub fn fail_next_set_handler(&self) {
        self.fail_next_set_handler.store(true, Ordering::Release);
    }

    /// The first shutdown code recorded, if any.
    pub fn shutdown_code(&self) -> Option<ErrorCode> {
        self.state.lock().shutdown_code
    }

    pub fn hold_count(&self) -> usize {
        self.holds.load(Ordering::Acquire)
    }

    /// Number of stages currently linked into the pipeline.
    pub fn stage_count(&self) -> usize {
        self.state.lock().pipeline.len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    /// Deliver a previously requested shutdown: notify stage handlers, fire
    /// the registered setup/accept sink, then destroy the pipeline if no
    /// holds remain. No-op if shutdown was not requested or already
    /// delivered.
    pub fn drive_shutdown(&self) {
        let (code, handlers, sink) = {
            let mut state = self.state.lock();
            let Some(code) = state.shutdown_code else {
                return;
            };
            if state.shutdown_delivered {
                return;
            }
            state.shutdown_delivered = true;
            let handlers: Vec<Arc<dyn ChannelHandler>> = state
                .pipeline
                .iter()
                .filter_map(|id| {
                    state
                        .stages
                        .iter()
                        .find(|s| s.id == *id)
                        .and_then(|s| s.handler.clone())
                })
                .collect();
            (code, handlers, state.sink.clone())
        };

        // Callbacks run without the state lock held; they may re-enter the
        // channel (release_hold, shutdown).
        for handler in handlers {
            handler.on_channel_shutdown(code);
        }
        if let Some(sink) = sink {
            let channel = self.weak_self.upgrade().expect("channel alive").as_channel();
            match sink {
                ShutdownSink::Client(events) => events.on_shutdown(&channel, code),
                ShutdownSink::Accept(events) => events.on_accept_shutdown(&channel, code),
            }
        }

        self.maybe_destroy();
    }

    fn maybe_destroy(&self) {
        let dropped = {
            let mut state = self.state.lock();
            if state.destroyed
                || !state.shutdown_delivered
                || self.holds.load(Ordering::Acquire) != 0
            {
                return;
            }
            state.destroyed = true;
            state.pipeline.clear();
            (std::mem::take(&mut state.stages), state.sink.take())
        };
        // Handlers and the events sink drop outside the lock.
        drop(dropped);
    }
}

impl Channel for TestChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn new_stage(&self) -> io::Result<StageId> {
        if self.fail_next_new_stage.swap(false, Ordering::AcqRel) {
            return Err(io::Error::other("stage allocation failed"));
        }
        let mut state = self.state.lock();
        let id = StageId(state.next_stage);
        state.next_stage += 1;
        state.stages.push(TestStage { id, handler: None });
        Ok(id)
    }

    fn insert_stage_end(&self, stage: StageId) -> io::Result<()> {
        let mut state = self.state.lock();
        if !state.stages.iter().any(|s| s.id == stage) {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "unknown stage"));
        }
        if state.pipeline.contains(&stage) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "stage already linked",
            ));
        }
        state.pipeline.push(stage);
        Ok(())
    }

    fn set_stage_handler(
        &self,
        stage: StageId,
        handler: Arc<dyn ChannelHandler>,
    ) -> io::Result<()> {
        if self.fail_next_set_handler.swap(false, Ordering::AcqRel) {
            return Err(io::Error::other("handler binding failed"));
        }
        let mut state = self.state.lock();
        let slot = state
            .stages
            .iter_mut()
            .find(|s| s.id == stage)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "unknown stage"))?;
        slot.handler = Some(handler);
        Ok(())
    }

    fn remove_stage(&self, stage: StageId) {
        let dropped = {
            let mut state = self.state.lock();
            state.pipeline.retain(|id| *id != stage);
            let index = state.stages.iter().position(|s| s.id == stage);
            index.map(|i| state.stages.remove(i))
        };
        drop(dropped);
    }

    fn upstream_handler(&self, stage: StageId) -> Option<Arc<dyn ChannelHandler>> {
        let state = self.state.lock();
        let position = state.pipeline.iter().position(|id| *id == stage)?;
        if position == 0 {
            return None;
        }
        let upstream = state.pipeline[position - 1];
        state
            .stages
            .iter()
            .find(|s| s.id == upstream)
            .and_then(|s| s.handler.clone())
    }

    fn acquire_hold(&self) {
        self.holds.fetch_add(1, Ordering::AcqRel);
    }

    fn release_hold(&self) {
        let prev = self.holds.fetch_sub(1, Ordering::AcqRel);
        assert!(prev > 0, "release_hold without matching acquire_hold");
        self.maybe_destroy();
    }

    fn shutdown(&self, error_code: ErrorCode) {
        let mut state = self.state.lock();
        if state.shutdown_code.is_none() {
            state.shutdown_code = Some(error_code);
        }
    }
}

/// Stand-in for a TLS stage handler reporting a fixed ALPN result.
pub struct TestTlsHandler {
    protocol: Bytes,
}

impl TestTlsHandler {
    pub fn new(alpn: &[u8]) -> Self {
        TestTlsHandler {
            protocol: Bytes::copy_from_slice(alpn),
        }
    }
}

impl ChannelHandler for TestTlsHandler {
    fn negotiated_protocol(&self) -> Option<Bytes> {
        Some(self.protocol.clone())
    }
}

/// A dial recorded by [`TestClientBootstrap`], waiting for the test to
/// complete it.
struct PendingDial {
    host_name: String,
    port: u16,
    tls: bool,
    events: Arc<dyn ChannelEvents>,
}

/// In-memory [`ClientBootstrap`]: records dials for the test to complete.
pub struct TestClientBootstrap {
    dials: Mutex<Vec<PendingDial>>,
    fail_next_dial: AtomicBool,
}

impl TestClientBootstrap {
    pub fn new() -> Arc<TestClientBootstrap> {
        Arc::new(TestClientBootstrap {
            dials: Mutex::new(Vec::new()),
            fail_next_dial: AtomicBool::new(false),
        })
    }

    /// Make the next dial fail synchronously, as if the transport refused
    /// to queue the attempt.
    pub fn fail_next_dial(&self) {
        self.fail_next_dial.store(true, Ordering::Release);
    }

    pub fn dial_count(&self) -> usize {
        self.dials.lock().len()
    }

    /// `(host_name, port, is_tls)` of a recorded dial.
    pub fn dial_target(&self, index: usize) -> (String, u16, bool) {
        let dials = self.dials.lock();
        let dial = &dials[index];
        (dial.host_name.clone(), dial.port, dial.tls)
    }

    /// Complete a recorded dial. `Ok` wires the channel's shutdown delivery
    /// to the dial's events and fires the setup callback with the channel;
    /// `Err` fires it with the error code. The dial record is consumed.
    pub fn complete_setup(&self, index: usize, result: Result<&Arc<TestChannel>, ErrorCode>) {
        let dial = self.dials.lock().remove(index);
        match result {
            Ok(channel) => {
                channel.set_client_events(dial.events.clone());
                dial.events.on_setup(Ok(channel.as_channel()));
            }
            Err(code) => {
                assert!(code != 0, "setup failure requires a non-zero code");
                dial.events.on_setup(Err(code));
            }
        }
    }
}

impl ClientBootstrap for TestClientBootstrap {
    fn new_socket_channel(
        &self,
        host_name: &str,
        port: u16,
        _socket_options: &SocketOptions,
        events: Arc<dyn ChannelEvents>,
    ) -> io::Result<()> {
        if self.fail_next_dial.swap(false, Ordering::AcqRel) {
            return Err(io::Error::other("dial refused"));
        }
        self.dials.lock().push(PendingDial {
            host_name: host_name.to_string(),
            port,
            tls: false,
            events,
        });
        Ok(())
    }

    fn new_tls_socket_channel(
        &self,
        host_name: &str,
        port: u16,
        _socket_options: &SocketOptions,
        _tls_options: &TlsOptions,
        events: Arc<dyn ChannelEvents>,
    ) -> io::Result<()> {
        if self.fail_next_dial.swap(false, Ordering::AcqRel) {
            return Err(io::Error::other("dial refused"));
        }
        self.dials.lock().push(PendingDial {
            host_name: host_name.to_string(),
            port,
            tls: true,
            events,
        });
        Ok(())
    }
}

/// In-memory listening socket produced by [`TestServerBootstrap`].
pub struct TestListener {
    endpoint: Endpoint,
    tls: bool,
    events: Mutex<Option<Arc<dyn AcceptEvents>>>,
    destroy_requests: AtomicUsize,
    destroyed: AtomicBool,
}

impl TestListener {
    pub fn is_tls(&self) -> bool {
        self.tls
    }

    pub fn destroy_requested(&self) -> bool {
        self.destroy_requests.load(Ordering::Acquire) > 0
    }

    /// How many times the bootstrap was asked to destroy this listener.
    pub fn destroy_request_count(&self) -> usize {
        self.destroy_requests.load(Ordering::Acquire)
    }

    /// Inject an accepted channel: wires the channel's shutdown delivery to
    /// the listener's events and fires the accept-setup callback.
    pub fn accept(&self, channel: &Arc<TestChannel>) {
        let events = self.events.lock().clone().expect("listener destroyed");
        channel.set_accept_events(events.clone());
        events.on_accept_setup(Ok(channel.as_channel()));
    }

    /// Inject a failed accept.
    pub fn accept_error(&self, code: ErrorCode) {
        assert!(code != 0, "accept failure requires a non-zero code");
        let events = self.events.lock().clone().expect("listener destroyed");
        events.on_accept_setup(Err(code));
    }

    /// Finish a requested destroy: fires `on_listener_destroy` and drops
    /// the events reference. The test is responsible for draining accepted
    /// channels first, as the real transport would.
    pub fn complete_destroy(&self) {
        assert!(
            self.destroy_requested(),
            "destroy completed without being requested"
        );
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let events = self.events.lock().take();
        if let Some(events) = events {
            events.on_listener_destroy();
        }
    }
}

impl ListenerSocket for TestListener {
    fn local_endpoint(&self) -> Endpoint {
        self.endpoint.clone()
    }
}

/// In-memory [`ServerBootstrap`]: hands out [`TestListener`]s.
pub struct TestServerBootstrap {
    listeners: Mutex<Vec<Arc<TestListener>>>,
    fail_next_listen: AtomicBool,
}

impl TestServerBootstrap {
    pub fn new() -> Arc<TestServerBootstrap> {
        Arc::new(TestServerBootstrap {
            listeners: Mutex::new(Vec::new()),
            fail_next_listen: AtomicBool::new(false),
        })
    }

    pub fn fail_next_listen(&self) {
        self.fail_next_listen.store(true, Ordering::Release);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn listener(&self, index: usize) -> Arc<TestListener> {
        self.listeners.lock()[index].clone()
    }

    fn listen(
        &self,
        endpoint: &Endpoint,
        tls: bool,
        events: Arc<dyn AcceptEvents>,
    ) -> io::Result<Arc<dyn ListenerSocket>> {
        if self.fail_next_listen.swap(false, Ordering::AcqRel) {
            return Err(io::Error::other("listen refused"));
        }
        let listener = Arc::new(TestListener {
            endpoint: endpoint.clone(),
            tls,
            events: Mutex::new(Some(events)),
            destroy_requests: AtomicUsize::new(0),
            destroyed: AtomicBool::new(false),
        });
        self.listeners.lock().push(listener.clone());
        Ok(listener)
    }
}

impl ServerBootstrap for TestServerBootstrap {
    fn new_socket_listener(
        &self,
        endpoint: &Endpoint,
        _socket_options: &SocketOptions,
        events: Arc<dyn AcceptEvents>,
    ) -> io::Result<Arc<dyn ListenerSocket>> {
        self.listen(endpoint, false, events)
    }

    fn new_tls_socket_listener(
        &self,
        endpoint: &Endpoint,
        _socket_options: &SocketOptions,
        _tls_options: &TlsOptions,
        events: Arc<dyn AcceptEvents>,
    ) -> io::Result<Arc<dyn ListenerSocket>> {
        self.listen(endpoint, true, events)
    }

    fn destroy_socket_listener(&self, socket: &Arc<dyn ListenerSocket>) {
        let target = Arc::as_ptr(socket) as *const ();
        let listeners = self.listeners.lock();
        for listener in listeners.iter() {
            if std::ptr::eq(Arc::as_ptr(listener) as *const (), target) {
                listener.destroy_requests.fetch_add(1, Ordering::AcqRel);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_handler_walks_the_pipeline() {
        let channel = TestChannel::with_tls(b"h2");
        let stage = channel.new_stage().unwrap();
        channel.insert_stage_end(stage).unwrap();

        let tls = channel.upstream_handler(stage).unwrap();
        assert_eq!(tls.negotiated_protocol().unwrap().as_ref(), b"h2");

        // The TLS stage itself has nothing upstream.
        let first = channel.state.lock().pipeline[0];
        assert!(channel.upstream_handler(first).is_none());
    }

    #[test]
    fn destroy_waits_for_shutdown_and_holds() {
        let channel = TestChannel::new();
        channel.acquire_hold();
        channel.shutdown(0);
        channel.drive_shutdown();
        assert!(!channel.is_destroyed());

        channel.release_hold();
        assert!(channel.is_destroyed());
    }

    #[test]
    fn first_shutdown_code_wins() {
        let channel = TestChannel::new();
        channel.shutdown(7);
        channel.shutdown(9);
        assert_eq!(channel.shutdown_code(), Some(7));
    }
}
