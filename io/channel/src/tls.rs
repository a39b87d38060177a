//! TLS configuration records, built on rustls.
//!
//! The lifecycle layer never drives a handshake itself. A [`TlsOptions`]
//! value is carried through a bootstrap to the transport's TLS stage; the
//! negotiated ALPN protocol is later read back through
//! [`ChannelHandler::negotiated_protocol`](crate::ChannelHandler::negotiated_protocol).

use std::io;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};

#[derive(Clone)]
enum TlsSide {
    Client(Arc<rustls::ClientConfig>),
    Server(Arc<rustls::ServerConfig>),
}

/// TLS configuration for one dial or one listener.
#[derive(Clone)]
pub struct TlsOptions {
    side: TlsSide,
    server_name: Option<String>,
    alpn: Vec<Vec<u8>>,
}

impl TlsOptions {
    /// Client-side configuration with the default webpki root store and no
    /// ALPN list.
    pub fn client(server_name: &str) -> io::Result<Self> {
        Self::client_with_alpn(server_name, Vec::new())
    }

    /// Client-side configuration advertising the given ALPN protocols.
    pub fn client_with_alpn(server_name: &str, protocols: Vec<Vec<u8>>) -> io::Result<Self> {
        let root_store =
            rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let mut config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        config.alpn_protocols = protocols.clone();

        Ok(TlsOptions {
            side: TlsSide::Client(Arc::new(config)),
            server_name: Some(server_name.to_string()),
            alpn: protocols,
        })
    }

    /// Client-side configuration for HTTP/2 (`h2` ALPN).
    pub fn h2(server_name: &str) -> io::Result<Self> {
        Self::client_with_alpn(server_name, vec![b"h2".to_vec()])
    }

    /// Server-side configuration from a certificate chain and private key.
    pub fn server(
        cert_chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    ) -> io::Result<Self> {
        Self::server_with_alpn(cert_chain, key, Vec::new())
    }

    /// Server-side configuration offering the given ALPN protocols.
    pub fn server_with_alpn(
        cert_chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
        protocols: Vec<Vec<u8>>,
    ) -> io::Result<Self> {
        let mut config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(cert_chain, key)
            .map_err(io::Error::other)?;
        config.alpn_protocols = protocols.clone();

        Ok(TlsOptions {
            side: TlsSide::Server(Arc::new(config)),
            server_name: None,
            alpn: protocols,
        })
    }

    /// The SNI name presented when dialing. `None` on server configurations.
    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    /// The ALPN protocols this side offers, in preference order.
    pub fn alpn(&self) -> &[Vec<u8>] {
        &self.alpn
    }

    pub fn is_client(&self) -> bool {
        matches!(self.side, TlsSide::Client(_))
    }

    pub fn client_config(&self) -> Option<&Arc<rustls::ClientConfig>> {
        match &self.side {
            TlsSide::Client(c) => Some(c),
            TlsSide::Server(_) => None,
        }
    }

    pub fn server_config(&self) -> Option<&Arc<rustls::ServerConfig>> {
        match &self.side {
            TlsSide::Server(c) => Some(c),
            TlsSide::Client(_) => None,
        }
    }
}

impl std::fmt::Debug for TlsOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsOptions")
            .field(
                "side",
                &match self.side {
                    TlsSide::Client(_) => "client",
                    TlsSide::Server(_) => "server",
                },
            )
            .field("server_name", &self.server_name)
            .field("alpn", &self.alpn)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn h2_offers_h2_alpn() {
        let options = TlsOptions::h2("example.com").unwrap();
        assert!(options.is_client());
        assert_eq!(options.server_name(), Some("example.com"));
        assert_eq!(options.alpn(), &[b"h2".to_vec()]);
        assert_eq!(
            options.client_config().unwrap().alpn_protocols,
            vec![b"h2".to_vec()]
        );
    }

    #[test]
    fn plain_client_offers_no_alpn() {
        let options = TlsOptions::client("example.com").unwrap();
        assert!(options.alpn().is_empty());
    }
}
