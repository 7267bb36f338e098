use std::sync::Arc;
use std::time::Duration;

use rumqttc::{LastWill, MqttOptions, QoS, TlsConfiguration, Transport};
use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::config::{MqttConfig, TlsConfig};
use crate::error::{Error, Result};

/// Map a configured QoS level to the client's enum.
pub fn qos(level: u8) -> Result<QoS> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(Error::Config(format!("Invalid QoS level: {}", other))),
    }
}

/// Build broker client options from the configuration.
///
/// `client_id` is the fully resolved identifier; `last_will` is registered
/// with the broker during the handshake.
pub fn mqtt_options(
    config: &MqttConfig,
    client_id: &str,
    last_will: Option<LastWill>,
) -> Result<MqttOptions> {
    let mut opts = MqttOptions::new(client_id, config.broker_address.clone(), config.broker_port);
    opts.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

    if let Some((username, password)) = config.credentials() {
        tracing::info!(username = %username, "Using username and password to connect");
        opts.set_credentials(username, password);
    }

    if config.tls.enabled {
        tracing::info!("TLS is enabled");
        opts.set_transport(tls_transport(&config.tls)?);
    }

    if let Some(will) = last_will {
        opts.set_last_will(will);
    }

    tracing::debug!(
        broker = %config.broker_address,
        port = config.broker_port,
        client_id = %client_id,
        "Broker client options ready"
    );

    Ok(opts)
}

/// Build the TLS transport: optional custom CA, optional hostname check bypass.
fn tls_transport(tls: &TlsConfig) -> Result<Transport> {
    let roots = Arc::new(root_store(tls)?);

    let config = if tls.insecure {
        tracing::info!("TLS: server hostname verification disabled");
        let verifier = WebPkiServerVerifier::builder(roots)
            .build()
            .map_err(|e| Error::Tls(e.to_string()))?;
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AnyHostnameVerifier(verifier)))
            .with_no_client_auth()
    } else {
        ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth()
    };

    Ok(Transport::Tls(TlsConfiguration::Rustls(Arc::new(config))))
}

/// Trust anchors: the configured CA file, or the platform store.
fn root_store(tls: &TlsConfig) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();

    match &tls.ca_path {
        Some(ca_path) => {
            tracing::info!(ca = %ca_path.display(), "TLS: custom CA used");
            let pem = std::fs::read(ca_path).map_err(|e| {
                Error::Config(format!(
                    "Failed to read CA certificate '{}': {}",
                    ca_path.display(),
                    e
                ))
            })?;
            for cert in rustls_pemfile::certs(&mut pem.as_slice()) {
                let cert = cert.map_err(|e| {
                    Error::Tls(format!("Invalid CA file '{}': {}", ca_path.display(), e))
                })?;
                roots.add(cert).map_err(|e| Error::Tls(e.to_string()))?;
            }
        }
        None => {
            let certs = rustls_native_certs::load_native_certs()
                .map_err(|e| Error::Tls(format!("Failed to load system roots: {}", e)))?;
            let (added, ignored) = roots.add_parsable_certificates(certs);
            tracing::debug!(added, ignored, "TLS: system roots loaded");
        }
    }

    if roots.is_empty() {
        return Err(Error::Tls("no trusted CA certificate found".into()));
    }
    Ok(roots)
}

/// Full chain and signature verification that accepts any server name.
#[derive(Debug)]
struct AnyHostnameVerifier(Arc<WebPkiServerVerifier>);

impl ServerCertVerifier for AnyHostnameVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        match self
            .0
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            Err(rustls::Error::InvalidCertificate(CertificateError::NotValidForName)) => {
                Ok(ServerCertVerified::assertion())
            }
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.0.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.0.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.supported_verify_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture_ca() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/ca.pem")
    }

    fn tls_config(insecure: bool) -> MqttConfig {
        let mut config = MqttConfig::new("broker.local", "bms");
        config.broker_port = 8883;
        config.tls.enabled = true;
        config.tls.ca_path = Some(fixture_ca());
        config.tls.insecure = insecure;
        config
    }

    #[test]
    fn test_plain_options() {
        let mut config = MqttConfig::new("broker.local", "bms");
        config.broker_port = 1884;
        config.keep_alive_secs = 30;

        let opts = mqtt_options(&config, "MqttBatterySender_1", None).unwrap();

        assert_eq!(opts.client_id(), "MqttBatterySender_1");
        assert_eq!(
            opts.broker_address(),
            ("broker.local".to_string(), 1884)
        );
        assert_eq!(opts.keep_alive(), Duration::from_secs(30));
        assert!(opts.credentials().is_none());
        assert!(opts.last_will().is_none());
    }

    #[test]
    fn test_credentials_and_last_will() {
        let mut config = MqttConfig::new("broker.local", "bms");
        config.username = Some("venus".into());
        config.password = Some("secret".into());
        let will = LastWill::new("bms/status", "offline", QoS::AtLeastOnce, true);

        let opts = mqtt_options(&config, "id", Some(will)).unwrap();

        assert_eq!(
            opts.credentials(),
            Some(("venus".to_string(), "secret".to_string()))
        );
        assert_eq!(opts.last_will().map(|w| w.topic), Some("bms/status".into()));
    }

    #[test]
    fn test_missing_ca_is_config_error() {
        let mut config = MqttConfig::new("broker.local", "bms");
        config.tls.enabled = true;
        config.tls.ca_path = Some(PathBuf::from("/nonexistent/ca.pem"));

        let result = mqtt_options(&config, "id", None);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_tls_with_custom_ca() {
        let opts = mqtt_options(&tls_config(false), "id", None).unwrap();
        assert!(matches!(
            opts.transport(),
            Transport::Tls(TlsConfiguration::Rustls(_))
        ));
    }

    #[test]
    fn test_tls_insecure_skips_hostname_check() {
        let opts = mqtt_options(&tls_config(true), "id", None).unwrap();
        assert!(matches!(
            opts.transport(),
            Transport::Tls(TlsConfiguration::Rustls(_))
        ));
    }

    fn fixture_cert(name: &str) -> CertificateDer<'static> {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name);
        let pem = std::fs::read(path).unwrap();
        rustls_pemfile::certs(&mut pem.as_slice())
            .next()
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_insecure_verifier_accepts_any_hostname() {
        let mut roots = RootCertStore::empty();
        roots.add(fixture_cert("ca.pem")).unwrap();
        let webpki = WebPkiServerVerifier::builder(Arc::new(roots)).build().unwrap();
        let verifier = AnyHostnameVerifier(webpki.clone());
        // The server certificate is issued for "localhost" only.
        let server = fixture_cert("server.pem");
        let other = ServerName::try_from("broker.example").unwrap();
        let localhost = ServerName::try_from("localhost").unwrap();

        assert!(matches!(
            webpki.verify_server_cert(&server, &[], &other, &[], UnixTime::now()),
            Err(rustls::Error::InvalidCertificate(CertificateError::NotValidForName))
        ));
        assert!(verifier
            .verify_server_cert(&server, &[], &other, &[], UnixTime::now())
            .is_ok());
        assert!(verifier
            .verify_server_cert(&server, &[], &localhost, &[], UnixTime::now())
            .is_ok());
    }

    #[test]
    fn test_insecure_verifier_still_checks_chain() {
        let mut roots = RootCertStore::empty();
        roots.add(fixture_cert("ca.pem")).unwrap();
        let webpki = WebPkiServerVerifier::builder(Arc::new(roots)).build().unwrap();
        let verifier = AnyHostnameVerifier(webpki);
        let name = ServerName::try_from("localhost").unwrap();

        // A CA certificate is not a valid server certificate.
        let ca = fixture_cert("ca.pem");
        let result = verifier.verify_server_cert(&ca, &[], &name, &[], UnixTime::now());
        assert!(result.is_err());
    }

    #[test]
    fn test_ca_without_certificates_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pem");
        std::fs::write(&path, "not a certificate\n").unwrap();

        let mut config = tls_config(true);
        config.tls.ca_path = Some(path);
        let result = mqtt_options(&config, "id", None);
        assert!(matches!(result, Err(Error::Tls(_))));
    }

    #[test]
    fn test_qos_levels() {
        assert_eq!(qos(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(qos(1).unwrap(), QoS::AtLeastOnce);
        assert_eq!(qos(2).unwrap(), QoS::ExactlyOnce);
        assert!(qos(3).is_err());
    }
}
