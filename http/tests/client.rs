//! Client connect path: dial, setup, shutdown, and their failure modes.

mod common;

use std::io;
use std::sync::Arc;

use channel_io::testing::{TestChannel, TestClientBootstrap};
use channel_io::{Channel, ChannelEvents, ClientBootstrap, SocketOptions, TlsOptions};
use crossbeam_channel::{Receiver, unbounded};
use http_conn::{
    ClientConnectionOptions, Connection, Dialer, HttpError, HttpVersion, ProxyOptions,
    client_connect,
};

const ECONNREFUSED: u32 = 111;

struct Dial {
    setup: Receiver<Result<Connection, HttpError>>,
    shutdown: Receiver<Result<(), HttpError>>,
}

fn options_pair(
    bootstrap: &Arc<TestClientBootstrap>,
    tls_options: Option<TlsOptions>,
) -> (ClientConnectionOptions, Dial) {
    let (setup_tx, setup_rx) = unbounded();
    let (shutdown_tx, shutdown_rx) = unbounded();
    let options = ClientConnectionOptions {
        bootstrap: bootstrap.clone(),
        host_name: "127.0.0.1".to_string(),
        port: 8080,
        socket_options: SocketOptions::default(),
        tls_options,
        initial_window_size: 65_536,
        on_setup: Box::new(move |result| setup_tx.send(result).unwrap()),
        on_shutdown: Some(Box::new(move |_connection, result| {
            shutdown_tx.send(result).unwrap()
        })),
        proxy_options: None,
        proxy_request_transform: None,
        dialer: None,
    };
    (
        options,
        Dial {
            setup: setup_rx,
            shutdown: shutdown_rx,
        },
    )
}

#[test]
fn plaintext_dial_connects_and_shuts_down_cleanly() {
    common::init();
    let bootstrap = TestClientBootstrap::new();
    let (options, dial) = options_pair(&bootstrap, None);
    client_connect(options).unwrap();

    assert_eq!(bootstrap.dial_count(), 1);
    assert_eq!(
        bootstrap.dial_target(0),
        ("127.0.0.1".to_string(), 8080, false)
    );

    let channel = TestChannel::new();
    bootstrap.complete_setup(0, Ok(&channel));

    let connection = dial.setup.try_recv().unwrap().unwrap();
    assert_eq!(connection.version(), HttpVersion::Http1_1);
    assert!(connection.is_client());
    assert!(connection.is_open());
    assert_eq!(channel.hold_count(), 1);

    // Setup fired exactly once and shutdown has not fired yet.
    assert!(dial.setup.try_recv().is_err());
    assert!(dial.shutdown.try_recv().is_err());

    connection.release();
    assert_eq!(channel.shutdown_code(), Some(0));
    assert_eq!(channel.hold_count(), 0);

    channel.drive_shutdown();
    assert_eq!(dial.shutdown.try_recv().unwrap(), Ok(()));
    assert!(dial.shutdown.try_recv().is_err());
    assert!(channel.is_destroyed());
}

#[test]
fn synchronous_dial_failure_skips_all_callbacks() {
    common::init();
    let bootstrap = TestClientBootstrap::new();
    bootstrap.fail_next_dial();
    let (options, dial) = options_pair(&bootstrap, None);

    assert!(client_connect(options).is_err());
    assert!(dial.setup.try_recv().is_err());
    assert!(dial.shutdown.try_recv().is_err());
}

/// The dial capability can be swapped out; a refusing dialer fails the
/// connect synchronously before anything reaches the bootstrap.
#[test]
fn refusing_dialer_fails_synchronously() {
    common::init();

    struct RefusingDialer;

    impl Dialer for RefusingDialer {
        fn new_socket_channel(
            &self,
            _bootstrap: &Arc<dyn ClientBootstrap>,
            _host_name: &str,
            _port: u16,
            _socket_options: &SocketOptions,
            _events: Arc<dyn ChannelEvents>,
        ) -> io::Result<()> {
            Err(io::Error::from_raw_os_error(13))
        }

        fn new_tls_socket_channel(
            &self,
            _bootstrap: &Arc<dyn ClientBootstrap>,
            _host_name: &str,
            _port: u16,
            _socket_options: &SocketOptions,
            _tls_options: &TlsOptions,
            _events: Arc<dyn ChannelEvents>,
        ) -> io::Result<()> {
            Err(io::Error::from_raw_os_error(13))
        }
    }

    let bootstrap = TestClientBootstrap::new();
    let (mut options, dial) = options_pair(&bootstrap, None);
    options.dialer = Some(Arc::new(RefusingDialer));

    assert_eq!(client_connect(options), Err(HttpError::Transport(13)));
    assert_eq!(bootstrap.dial_count(), 0);
    assert!(dial.setup.try_recv().is_err());
}

#[test]
fn empty_host_name_is_an_invalid_argument() {
    common::init();
    let bootstrap = TestClientBootstrap::new();
    let (mut options, _dial) = options_pair(&bootstrap, None);
    options.host_name = String::new();
    assert_eq!(client_connect(options), Err(HttpError::InvalidArgument));
}

#[test]
fn setup_error_reaches_on_setup_only() {
    common::init();
    let bootstrap = TestClientBootstrap::new();
    let (options, dial) = options_pair(&bootstrap, None);
    client_connect(options).unwrap();

    bootstrap.complete_setup(0, Err(ECONNREFUSED));

    match dial.setup.try_recv().unwrap() {
        Err(e) => assert_eq!(e, HttpError::Transport(ECONNREFUSED)),
        Ok(_) => panic!("expected setup failure"),
    }
    assert!(dial.shutdown.try_recv().is_err());
}

/// Stage installation fails after the channel exists: the failure must be
/// delivered through the shutdown callback, still exactly once.
#[test]
fn install_failure_is_delivered_by_the_shutdown_callback() {
    common::init();
    let bootstrap = TestClientBootstrap::new();
    let (options, dial) = options_pair(&bootstrap, None);
    client_connect(options).unwrap();

    let channel = TestChannel::new();
    channel.fail_next_new_stage();
    bootstrap.complete_setup(0, Ok(&channel));

    // Not notified yet; the channel shutdown will do it.
    assert!(dial.setup.try_recv().is_err());
    assert!(channel.shutdown_code().is_some());

    channel.drive_shutdown();
    assert!(dial.setup.try_recv().unwrap().is_err());
    assert!(dial.shutdown.try_recv().is_err());
    assert!(channel.is_destroyed());
}

/// A failed setup whose channel shut down with a zero code still reports a
/// real error to the user.
#[test]
fn failed_setup_with_clean_shutdown_code_synthesizes_an_error() {
    common::init();
    let bootstrap = TestClientBootstrap::new();
    let (options, dial) = options_pair(&bootstrap, None);
    client_connect(options).unwrap();

    let channel = TestChannel::new();
    channel.shutdown(0);
    channel.fail_next_new_stage();
    bootstrap.complete_setup(0, Ok(&channel));

    channel.drive_shutdown();
    match dial.setup.try_recv().unwrap() {
        Err(e) => assert_eq!(e, HttpError::Unknown),
        Ok(_) => panic!("expected setup failure"),
    }
}

#[test]
fn tls_alpn_http1_1_yields_a_http1_1_connection() {
    common::init();
    let bootstrap = TestClientBootstrap::new();
    let (options, dial) = options_pair(&bootstrap, Some(TlsOptions::client("example.com").unwrap()));
    client_connect(options).unwrap();
    assert!(bootstrap.dial_target(0).2, "dial should use TLS");

    let channel = TestChannel::with_tls(b"http/1.1");
    bootstrap.complete_setup(0, Ok(&channel));

    let connection = dial.setup.try_recv().unwrap().unwrap();
    assert_eq!(connection.version(), HttpVersion::Http1_1);
    connection.release();
    channel.drive_shutdown();
}

#[cfg(feature = "http2")]
#[test]
fn tls_alpn_h2_yields_a_http2_connection() {
    common::init();
    let bootstrap = TestClientBootstrap::new();
    let (options, dial) = options_pair(&bootstrap, Some(TlsOptions::h2("example.com").unwrap()));
    client_connect(options).unwrap();

    let channel = TestChannel::with_tls(b"h2");
    bootstrap.complete_setup(0, Ok(&channel));

    let connection = dial.setup.try_recv().unwrap().unwrap();
    assert_eq!(connection.version(), HttpVersion::Http2);
    assert!(connection.is_open());
    connection.release();
    channel.drive_shutdown();
    assert!(channel.is_destroyed());
}

#[test]
fn proxy_options_redirect_the_dial_and_install_a_transform() {
    common::init();
    let bootstrap = TestClientBootstrap::new();
    let (mut options, dial) = options_pair(&bootstrap, None);
    options.host_name = "origin.example".to_string();
    options.port = 80;
    options.proxy_options = Some(ProxyOptions {
        host_name: "proxy.local".to_string(),
        port: 3128,
        tls_options: None,
    });
    client_connect(options).unwrap();

    // The channel goes to the proxy, not the origin.
    assert_eq!(
        bootstrap.dial_target(0),
        ("proxy.local".to_string(), 3128, false)
    );

    let channel = TestChannel::new();
    bootstrap.complete_setup(0, Ok(&channel));

    let connection = dial.setup.try_recv().unwrap().unwrap();
    let transform = connection.request_transform().expect("transform installed");
    let mut target = "/index.html".to_string();
    (*transform)(&mut target);
    assert_eq!(target, "http://origin.example:80/index.html");

    connection.release();
    channel.drive_shutdown();
}
