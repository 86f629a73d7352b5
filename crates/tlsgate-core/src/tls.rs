//! TLS acceptor construction for hosts
//!
//! The host performs the handshake; this module only shapes its rustls
//! configuration from the enforcement policy so that what is offered on the
//! wire matches what the engine will accept.

use anyhow::{anyhow, Result};
use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::version::{TLS12, TLS13};
use rustls::{ProtocolVersion, ServerConfig, SupportedCipherSuite, SupportedProtocolVersion};
use rustls_pemfile::{certs, private_key};
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use tlsgate_common::config::TlsConfig;
use tlsgate_common::PolicyConfig;
use tokio_rustls::TlsAcceptor;
use tracing::{info, warn};

/// Protocol versions from the allow-list that rustls can serve
pub fn protocol_versions(policy: &PolicyConfig) -> Vec<&'static SupportedProtocolVersion> {
    let mut versions = Vec::new();
    if policy.allows_protocol("TLSv1.3") {
        versions.push(&TLS13);
    }
    if policy.allows_protocol("TLSv1.2") {
        versions.push(&TLS12);
    }
    versions
}

/// Cipher suites in policy order, limited to the allowed protocol versions.
///
/// Names rustls does not implement are skipped with a warning.
pub fn select_cipher_suites(policy: &PolicyConfig) -> Vec<SupportedCipherSuite> {
    let allowed_versions: Vec<ProtocolVersion> = protocol_versions(policy)
        .iter()
        .map(|v| v.version)
        .collect();

    let mut selected = Vec::new();
    for name in &policy.cipher_suites {
        let suite = ring::ALL_CIPHER_SUITES
            .iter()
            .find(|s| cipher_suite_name(s).eq_ignore_ascii_case(name));

        match suite {
            Some(suite) if allowed_versions.contains(&suite.version().version) => {
                selected.push(*suite);
            }
            Some(_) => {}
            None => warn!("Unsupported cipher suite in policy: {}", name),
        }
    }

    selected
}

/// Name of a cipher suite as written in the policy, e.g. `TLS13_AES_256_GCM_SHA384`
pub fn cipher_suite_name(suite: &SupportedCipherSuite) -> String {
    format!("{:?}", suite.suite())
}

/// Load the certificate chain and private key named in `tls_config`
fn load_certified_key(
    tls_config: &TlsConfig,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let cert_file = File::open(&tls_config.cert_path)
        .map_err(|e| anyhow!("Failed to open certificate file: {}", e))?;
    let mut cert_reader = BufReader::new(cert_file);
    let certs: Vec<CertificateDer<'static>> = certs(&mut cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow!("Failed to parse certificates: {}", e))?;

    if certs.is_empty() {
        return Err(anyhow!("No certificates found in certificate file"));
    }

    info!("Loaded {} certificate(s)", certs.len());

    let key_file = File::open(&tls_config.key_path)
        .map_err(|e| anyhow!("Failed to open key file: {}", e))?;
    let mut key_reader = BufReader::new(key_file);
    let key = private_key(&mut key_reader)
        .map_err(|e| anyhow!("Failed to read private key: {}", e))?
        .ok_or_else(|| anyhow!("No private key found in key file"))?;

    Ok((certs, key))
}

/// Build a rustls server configuration honoring the policy
pub fn build_server_config(tls_config: &TlsConfig, policy: &PolicyConfig) -> Result<ServerConfig> {
    let versions = protocol_versions(policy);
    if versions.is_empty() {
        return Err(anyhow!(
            "Policy allows no protocol version supported by rustls (TLSv1.2, TLSv1.3)"
        ));
    }

    let cipher_suites = select_cipher_suites(policy);
    if cipher_suites.is_empty() {
        return Err(anyhow!("Policy selects no usable cipher suite"));
    }

    let (certs, key) = load_certified_key(tls_config)?;

    let provider = CryptoProvider {
        cipher_suites,
        ..ring::default_provider()
    };

    let mut server_config = ServerConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(&versions)
        .map_err(|e| anyhow!("Failed to apply protocol versions: {}", e))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| anyhow!("Failed to create TLS config: {}", e))?;

    server_config.ignore_client_order = policy.honor_cipher_order;

    Ok(server_config)
}

/// Load TLS configuration and create an acceptor
pub fn create_tls_acceptor(tls_config: &TlsConfig, policy: &PolicyConfig) -> Result<TlsAcceptor> {
    let server_config = build_server_config(tls_config, policy)?;
    Ok(TlsAcceptor::from(Arc::new(server_config)))
}
