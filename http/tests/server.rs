//! Server listener: accept path, synced map, graceful shutdown, destroy.

mod common;

use std::sync::Arc;

use channel_io::testing::{TestChannel, TestListener, TestServerBootstrap};
use channel_io::{Channel, Endpoint, SocketOptions};
use crossbeam_channel::{Receiver, unbounded};
use http_conn::{
    Connection, HttpError, HttpVersion, Server, ServerConnectionOptions, ServerOptions,
};

const ECONNABORTED: u32 = 103;

struct TestServer {
    server: Server,
    listener: Arc<TestListener>,
    incoming: Receiver<Result<Connection, HttpError>>,
    conn_shutdowns: Receiver<Result<(), HttpError>>,
    destroyed: Receiver<()>,
}

/// Start a plaintext server whose incoming-connection callback configures
/// each connection (unless `configure` is false) and reports events to the
/// test over channels.
fn start_server(bootstrap: &Arc<TestServerBootstrap>, configure: bool) -> TestServer {
    let (incoming_tx, incoming_rx) = unbounded();
    let (shutdown_tx, shutdown_rx) = unbounded();
    let (destroy_tx, destroy_rx) = unbounded();

    let server = Server::new(ServerOptions {
        bootstrap: bootstrap.clone(),
        endpoint: Endpoint {
            address: "127.0.0.1".to_string(),
            port: 8080,
        },
        socket_options: SocketOptions::default(),
        tls_options: None,
        initial_window_size: 65_536,
        on_incoming_connection: Box::new(move |result| {
            if configure {
                if let Ok(connection) = &result {
                    let shutdown_tx = shutdown_tx.clone();
                    connection
                        .configure_server(ServerConnectionOptions {
                            on_incoming_request: Arc::new(|_connection| {}),
                            on_shutdown: Some(Box::new(move |_connection, result| {
                                shutdown_tx.send(result).unwrap()
                            })),
                        })
                        .unwrap();
                }
            }
            incoming_tx.send(result).unwrap();
        }),
        on_destroy_complete: Some(Box::new(move || destroy_tx.send(()).unwrap())),
    })
    .unwrap();

    let listener = bootstrap.listener(0);
    TestServer {
        server,
        listener,
        incoming: incoming_rx,
        conn_shutdowns: shutdown_rx,
        destroyed: destroy_rx,
    }
}

#[test]
fn accepted_connection_is_configured_and_observes_peer_shutdown() {
    common::init();
    let bootstrap = TestServerBootstrap::new();
    let ts = start_server(&bootstrap, true);

    let channel = TestChannel::new();
    ts.listener.accept(&channel);

    let connection = ts.incoming.try_recv().unwrap().unwrap();
    assert_eq!(connection.version(), HttpVersion::Http1_1);
    assert!(connection.is_server());
    assert!(connection.is_open());
    assert_eq!(channel.hold_count(), 1);

    // Peer closes: the channel shuts down and the connection's shutdown
    // callback fires exactly once as the map entry is removed.
    channel.shutdown(0);
    channel.drive_shutdown();
    assert_eq!(ts.conn_shutdowns.try_recv().unwrap(), Ok(()));
    assert!(ts.conn_shutdowns.try_recv().is_err());
    assert!(!connection.is_open());

    connection.release();
    assert!(channel.is_destroyed());

    ts.server.release();
    ts.listener.complete_destroy();
    assert!(ts.destroyed.try_recv().is_ok());
}

#[test]
fn unconfigured_connection_is_shut_down_with_reaction_required() {
    common::init();
    let bootstrap = TestServerBootstrap::new();
    let ts = start_server(&bootstrap, false);

    let channel = TestChannel::new();
    ts.listener.accept(&channel);

    // The user saw the connection but never configured it.
    assert!(ts.incoming.try_recv().unwrap().is_ok());
    assert_eq!(
        channel.shutdown_code(),
        Some(HttpError::ReactionRequired.code())
    );

    channel.drive_shutdown();
    // No server-role shutdown callback was ever registered.
    assert!(ts.conn_shutdowns.try_recv().is_err());
    // The accept path released the user-side refcount, so nothing leaks.
    assert!(channel.is_destroyed());

    ts.server.release();
    ts.listener.complete_destroy();
    assert!(ts.destroyed.try_recv().is_ok());
}

#[test]
fn graceful_shutdown_drains_two_live_connections() {
    common::init();
    let bootstrap = TestServerBootstrap::new();
    let ts = start_server(&bootstrap, true);

    let channel_one = TestChannel::new();
    let channel_two = TestChannel::new();
    ts.listener.accept(&channel_one);
    ts.listener.accept(&channel_two);
    let conn_one = ts.incoming.try_recv().unwrap().unwrap();
    let conn_two = ts.incoming.try_recv().unwrap().unwrap();

    ts.server.release();

    let closed = HttpError::ConnectionClosed.code();
    assert_eq!(channel_one.shutdown_code(), Some(closed));
    assert_eq!(channel_two.shutdown_code(), Some(closed));
    assert_eq!(ts.listener.destroy_request_count(), 1);

    // A second release returns immediately without re-shutting anything.
    ts.server.release();
    assert_eq!(ts.listener.destroy_request_count(), 1);

    channel_one.drive_shutdown();
    channel_two.drive_shutdown();
    assert_eq!(
        ts.conn_shutdowns.try_recv().unwrap(),
        Err(HttpError::ConnectionClosed)
    );
    assert_eq!(
        ts.conn_shutdowns.try_recv().unwrap(),
        Err(HttpError::ConnectionClosed)
    );

    conn_one.release();
    conn_two.release();
    assert!(channel_one.is_destroyed());
    assert!(channel_two.is_destroyed());

    ts.listener.complete_destroy();
    assert!(ts.destroyed.try_recv().is_ok());
}

#[test]
fn accept_during_shutdown_is_refused_with_connection_closed() {
    common::init();
    let bootstrap = TestServerBootstrap::new();
    let ts = start_server(&bootstrap, true);

    ts.server.release();

    let channel = TestChannel::new();
    ts.listener.accept(&channel);

    match ts.incoming.try_recv().unwrap() {
        Err(e) => assert_eq!(e, HttpError::ConnectionClosed),
        Ok(_) => panic!("expected the accept to be refused"),
    }
    assert_eq!(
        channel.shutdown_code(),
        Some(HttpError::ConnectionClosed.code())
    );

    channel.drive_shutdown();
    assert!(channel.is_destroyed());

    ts.listener.complete_destroy();
    assert!(ts.destroyed.try_recv().is_ok());
}

#[test]
fn transport_accept_error_reaches_the_incoming_callback() {
    common::init();
    let bootstrap = TestServerBootstrap::new();
    let ts = start_server(&bootstrap, true);

    ts.listener.accept_error(ECONNABORTED);
    match ts.incoming.try_recv().unwrap() {
        Err(e) => assert_eq!(e, HttpError::Transport(ECONNABORTED)),
        Ok(_) => panic!("expected a failed accept"),
    }

    ts.server.release();
    ts.listener.complete_destroy();
    assert!(ts.destroyed.try_recv().is_ok());
}

#[test]
fn listener_creation_failure_fails_server_new() {
    common::init();
    let bootstrap = TestServerBootstrap::new();
    bootstrap.fail_next_listen();

    let result = Server::new(ServerOptions {
        bootstrap: bootstrap.clone(),
        endpoint: Endpoint {
            address: "127.0.0.1".to_string(),
            port: 8080,
        },
        socket_options: SocketOptions::default(),
        tls_options: None,
        initial_window_size: 0,
        on_incoming_connection: Box::new(|_result| {}),
        on_destroy_complete: None,
    });
    assert!(result.is_err());
}
