//! Compiling descriptor TLS material into a rustls client configuration.
//!
//! The parser only records *which* files to use ([`TlsMaterial`] paths);
//! this module reads and validates them. TLS handshake mechanics live in
//! the transport.

use crate::client::TlsMaterial;
use crate::{Error, Result};
use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

/// Build a `rustls::ClientConfig` from TLS material paths.
///
/// A missing CA path means the system root store (falling back to the
/// bundled webpki roots when none can be loaded). Client certificate and
/// key must be given together; one without the other is rejected here,
/// before any handshake.
pub fn client_config(material: &TlsMaterial) -> Result<Arc<ClientConfig>> {
    let roots = match &material.ca {
        Some(ca_path) => load_ca_roots(ca_path)?,
        None => system_roots()?,
    };

    let builder = ClientConfig::builder().with_root_certificates(roots);
    let config = match (&material.cert, &material.key) {
        (Some(cert_path), Some(key_path)) => {
            let certs = load_cert_chain(cert_path)?;
            let key = load_private_key(key_path)?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| Error::Tls(format!("invalid client certificate/key pair: {}", e)))?
        }
        (None, None) => builder.with_no_client_auth(),
        (Some(_), None) => {
            return Err(Error::Tls(
                "ssl-cert was given without ssl-key".to_string(),
            ))
        }
        (None, Some(_)) => {
            return Err(Error::Tls(
                "ssl-key was given without ssl-cert".to_string(),
            ))
        }
    };

    Ok(Arc::new(config))
}

/// Server name for SNI: IP literals (including unbracketed IPv6 as stored
/// in the settings) and DNS names are both accepted.
pub fn server_name(host: &str) -> Result<ServerName<'static>> {
    let host = host.trim_end_matches('.');
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ServerName::IpAddress(ip.into()));
    }
    ServerName::try_from(host.to_string())
        .map_err(|_| Error::Tls(format!("invalid TLS server name '{}'", host)))
}

fn system_roots() -> Result<RootCertStore> {
    let result = rustls_native_certs::load_native_certs();

    let mut store = RootCertStore::empty();
    for cert in result.certs {
        let _ = store.add_parsable_certificates(std::iter::once(cert));
    }
    if store.is_empty() {
        store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }
    if store.is_empty() {
        return Err(Error::Tls("no root certificates available".to_string()));
    }
    Ok(store)
}

fn load_ca_roots(path: &Path) -> Result<RootCertStore> {
    let data = fs::read(path)
        .map_err(|e| Error::Tls(format!("cannot read ssl-ca '{}': {}", path.display(), e)))?;

    let mut reader = std::io::Cursor::new(&data);
    let mut store = RootCertStore::empty();
    let mut found = 0;
    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(rustls_pemfile::Item::X509Certificate(cert))) => {
                let _ = store.add_parsable_certificates(std::iter::once(cert));
                found += 1;
            }
            Ok(Some(_)) => {} // keys and other PEM items are not roots
            Ok(None) => break,
            Err(_) => {
                return Err(Error::Tls(format!(
                    "invalid PEM in ssl-ca '{}'",
                    path.display()
                )))
            }
        }
    }
    if found == 0 {
        return Err(Error::Tls(format!(
            "no certificates found in ssl-ca '{}'",
            path.display()
        )));
    }
    Ok(store)
}

fn load_cert_chain(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let data = fs::read(path)
        .map_err(|e| Error::Tls(format!("cannot read ssl-cert '{}': {}", path.display(), e)))?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut std::io::Cursor::new(&data))
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| Error::Tls(format!("invalid PEM in ssl-cert '{}'", path.display())))?;
    if certs.is_empty() {
        return Err(Error::Tls(format!(
            "no certificates found in ssl-cert '{}'",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let data = fs::read(path)
        .map_err(|e| Error::Tls(format!("cannot read ssl-key '{}': {}", path.display(), e)))?;
    rustls_pemfile::private_key(&mut std::io::Cursor::new(&data))
        .map_err(|_| Error::Tls(format!("invalid PEM in ssl-key '{}'", path.display())))?
        .ok_or_else(|| Error::Tls(format!("no private key found in ssl-key '{}'", path.display())))
}
