// src/tls.rs
//! TLS material for the KubeKit API server: a private CA, a server
//! certificate signed by it, and client certificates for mutual TLS.
//!
//! Files live in one directory: `<name>.key`, `<name>.crt`, `<name>-ca.crt`
//! and `<name>-ca.key`, all mode 0600.

use crate::cert::key::DEFAULT_KEY_BITS;
use crate::cert::{Certificate, CertificateOptions, ExtKeyUsage, PkiError, Result, UsedAs};
use crate::utils::logging::Logger;
use openssl::ssl::{SslAcceptor, SslConnector, SslMethod, SslVerifyMode};
use std::fs;
use std::path::{Path, PathBuf};

const LOCAL_SANS: [&str; 2] = ["localhost", "127.0.0.1"];

#[derive(Debug)]
pub struct ServerTlsMaterial {
    dir: PathBuf,
    name: String,
    bits: u32,
    ca: Certificate,
    server: Certificate,
}

impl ServerTlsMaterial {
    /// Loads the material for `server_name` from `dir`, creating whatever is
    /// missing. The server certificate covers `server_name`, localhost and
    /// `extra_sans`.
    pub fn ensure(
        dir: &Path,
        server_name: &str,
        extra_sans: &[String],
        logger: &mut dyn Logger,
    ) -> Result<Self> {
        Self::ensure_with_bits(dir, server_name, extra_sans, DEFAULT_KEY_BITS, logger)
    }

    pub fn ensure_with_bits(
        dir: &Path,
        server_name: &str,
        extra_sans: &[String],
        bits: u32,
        logger: &mut dyn Logger,
    ) -> Result<Self> {
        if server_name.trim().is_empty() {
            return Err(PkiError::Validation("server name is required".to_string()));
        }
        fs::create_dir_all(dir)?;

        let ca = Self::ensure_ca(dir, server_name, bits, logger)?;
        let server = Self::ensure_server(dir, server_name, extra_sans, bits, &ca, logger)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            name: server_name.to_string(),
            bits,
            ca,
            server,
        })
    }

    fn ensure_ca(
        dir: &Path,
        server_name: &str,
        bits: u32,
        logger: &mut dyn Logger,
    ) -> Result<Certificate> {
        let ca_name = format!("{}-ca", server_name);
        let mut options = CertificateOptions::new(&ca_name).with_certs_dir(dir);
        options.bits = bits;
        options.duration_days = 3650;
        options.used_as = UsedAs::Ca;
        let mut ca = Certificate::new(&ca_name, options);

        match ca.load().map(|_| ()) {
            Ok(_) => {
                logger.debug_log(&format!("Using TLS CA {}", ca.options().cert_path().display()));
                return Ok(ca);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        logger.log(&format!("Generating TLS CA {}", ca_name));
        ca.generate_ca()?.persist()?;
        Ok(ca)
    }

    fn ensure_server(
        dir: &Path,
        server_name: &str,
        extra_sans: &[String],
        bits: u32,
        ca: &Certificate,
        logger: &mut dyn Logger,
    ) -> Result<Certificate> {
        let mut options = CertificateOptions::new(server_name).with_certs_dir(dir);
        options.bits = bits;
        options.used_as = UsedAs::Server;
        options.ext_key_usage = vec![ExtKeyUsage::ServerAuth];
        options.add_alt_names(&[server_name]);
        options.add_alt_names(&LOCAL_SANS);
        options.add_alt_names(extra_sans);

        let mut server = Certificate::new(server_name, options.clone());
        match server.load().map(|_| ()) {
            Ok(_) if issued_by(&server, ca)? => {
                logger.debug_log(&format!(
                    "Using TLS certificate {}",
                    server.options().cert_path().display()
                ));
                return Ok(server);
            }
            Ok(_) => logger.warn(&format!(
                "TLS certificate {} was not issued by {}, replacing it",
                server_name,
                ca.name()
            )),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        logger.log(&format!("Issuing TLS certificate for {}", server_name));
        let mut server = Certificate::new(server_name, options);
        server.generate_signed_certificate(ca)?.persist()?;
        Ok(server)
    }

    pub fn ca(&self) -> &Certificate {
        &self.ca
    }

    pub fn server(&self) -> &Certificate {
        &self.server
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Issues and stores `<dir>/<common_name>.key/.crt`, a client
    /// certificate signed by the server's CA.
    pub fn issue_client(&self, common_name: &str, organization: &str) -> Result<Certificate> {
        let mut options = CertificateOptions::new(common_name).with_certs_dir(&self.dir);
        options.bits = self.bits;
        options.organization = organization.to_string();
        options.used_as = UsedAs::Client;
        options.ext_key_usage = vec![ExtKeyUsage::ClientAuth];

        let mut client = Certificate::new(common_name, options);
        client.generate_signed_certificate(&self.ca)?.persist()?;
        Ok(client)
    }

    /// Server side of mutual TLS: presents the server certificate and only
    /// accepts clients signed by the CA.
    pub fn acceptor(&self) -> Result<SslAcceptor> {
        let ca_cert = self.ca.certificate().ok_or_else(missing("CA certificate"))?;
        let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls_server())?;
        builder.set_private_key(self.server.private_key().ok_or_else(missing("server key"))?)?;
        builder.set_certificate(
            self.server
                .certificate()
                .ok_or_else(missing("server certificate"))?,
        )?;
        builder.check_private_key()?;
        builder.cert_store_mut().add_cert(ca_cert.clone())?;
        builder.add_client_ca(ca_cert)?;
        builder.set_verify(SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT);
        Ok(builder.build())
    }

    /// Client side of mutual TLS for a certificate from [`Self::issue_client`].
    pub fn connector(&self, client: &Certificate) -> Result<SslConnector> {
        let ca_cert = self.ca.certificate().ok_or_else(missing("CA certificate"))?;
        let mut builder = SslConnector::builder(SslMethod::tls_client())?;
        builder.cert_store_mut().add_cert(ca_cert.clone())?;
        builder.set_private_key(client.private_key().ok_or_else(missing("client key"))?)?;
        builder.set_certificate(client.certificate().ok_or_else(missing("client certificate"))?)?;
        builder.check_private_key()?;
        Ok(builder.build())
    }
}

fn missing(what: &'static str) -> impl FnOnce() -> PkiError {
    move || PkiError::Precondition(format!("TLS material has no {}", what))
}

fn issued_by(leaf: &Certificate, ca: &Certificate) -> Result<bool> {
    match (leaf.certificate(), ca.private_key()) {
        (Some(cert), Some(key)) => Ok(cert.verify(key)?),
        _ => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::logging::tests::MockLogger;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::os::unix::fs::PermissionsExt;
    use std::thread;
    use tempfile::TempDir;

    fn material(dir: &Path, logger: &mut MockLogger) -> ServerTlsMaterial {
        ServerTlsMaterial::ensure_with_bits(
            dir,
            "kubekit-api",
            &["api.example.com".to_string()],
            2048,
            logger,
        )
        .unwrap()
    }

    #[test]
    fn creates_material_by_naming_convention() {
        let dir = TempDir::new().unwrap();
        let mut logger = MockLogger::default();
        let tls = material(dir.path(), &mut logger);

        for file in [
            "kubekit-api.key",
            "kubekit-api.crt",
            "kubekit-api-ca.key",
            "kubekit-api-ca.crt",
        ] {
            let mode = fs::metadata(dir.path().join(file))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600, "{}", file);
        }

        let server = tls.server().options();
        assert!(server.dns_names.contains(&"api.example.com".to_string()));
        assert!(server.dns_names.contains(&"localhost".to_string()));
        assert_eq!(server.ip_addresses, vec!["127.0.0.1".parse::<std::net::IpAddr>().unwrap()]);
    }

    #[test]
    fn second_call_reuses_files() {
        let dir = TempDir::new().unwrap();
        let mut logger = MockLogger::default();
        let first = material(dir.path(), &mut logger);
        let second = material(dir.path(), &mut logger);

        assert_eq!(
            first.server().certificate_to_pem().unwrap(),
            second.server().certificate_to_pem().unwrap()
        );
        assert_eq!(
            first.ca().certificate_to_pem().unwrap(),
            second.ca().certificate_to_pem().unwrap()
        );
    }

    #[test]
    fn server_certificate_from_another_ca_is_replaced() {
        let dir = TempDir::new().unwrap();
        let mut logger = MockLogger::default();
        let first = material(dir.path(), &mut logger);
        fs::remove_file(dir.path().join("kubekit-api-ca.key")).unwrap();

        let second = material(dir.path(), &mut logger);
        assert_ne!(
            first.server().certificate_to_pem().unwrap(),
            second.server().certificate_to_pem().unwrap()
        );
        assert!(logger.lines().iter().any(|l| l.contains("[WARN]")));
    }

    #[test]
    fn empty_server_name_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = ServerTlsMaterial::ensure_with_bits(
            dir.path(),
            " ",
            &[],
            2048,
            &mut MockLogger::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PkiError::Validation(_)));
    }

    #[test]
    fn mutual_tls_handshake() {
        let dir = TempDir::new().unwrap();
        let tls = material(dir.path(), &mut MockLogger::default());
        let client = tls.issue_client("kubekit-cli", "system:masters").unwrap();
        assert!(dir.path().join("kubekit-cli.crt").exists());

        let acceptor = tls.acceptor().unwrap();
        let connector = tls.connector(&client).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut stream = acceptor.accept(stream).unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).unwrap();
            stream.write_all(&buf).unwrap();
        });

        let stream = TcpStream::connect(addr).unwrap();
        let mut stream = connector.connect("localhost", stream).unwrap();
        stream.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
        server.join().unwrap();
    }
}
