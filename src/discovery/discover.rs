// src/discovery/discover.rs
use crate::utils::logging::Logger;
use chrono::{DateTime, Duration, TimeZone, Utc};
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509StoreContext, X509};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{fs, io};
use x509_parser::prelude::{FromDer, GeneralName, ParsedExtension, X509Certificate};

const EXPIRY_WARNING_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpirationStatus {
    Valid,
    ExpiringSoon,
    Expired,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CertificateInfo {
    pub path: PathBuf,
    pub subject: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub serial: String,
    pub fingerprint: String,
    pub is_ca: bool,
    #[serde(default)]
    pub dns_names: Vec<String>,
    #[serde(default)]
    pub ip_addresses: Vec<String>,
    pub status: ExpirationStatus,
    /// Whether a CA found in the same scan verifies this certificate; `None`
    /// for CAs and when no CA with a matching subject was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_chain_valid: Option<bool>,
}

fn invalid_data<E>(e: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::InvalidData, e)
}

fn timestamp(seconds: i64, what: &str) -> io::Result<DateTime<Utc>> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| invalid_data(format!("Invalid {} timestamp", what)))
}

pub fn expiration_status(not_after: DateTime<Utc>, now: DateTime<Utc>) -> ExpirationStatus {
    if not_after < now {
        ExpirationStatus::Expired
    } else if not_after - now < Duration::days(EXPIRY_WARNING_DAYS) {
        ExpirationStatus::ExpiringSoon
    } else {
        ExpirationStatus::Valid
    }
}

pub fn analyze_certificate(path: &Path) -> io::Result<CertificateInfo> {
    let cert_pem = fs::read(path)?;

    let cert_der = if cert_pem.starts_with(b"-----BEGIN CERTIFICATE-----") {
        X509::from_pem(&cert_pem)
            .and_then(|cert| cert.to_der())
            .map_err(invalid_data)?
    } else {
        cert_pem
    };

    let (_remainder, cert) = X509Certificate::from_der(&cert_der).map_err(invalid_data)?;

    let not_before = timestamp(cert.validity().not_before.timestamp(), "not_before")?;
    let not_after = timestamp(cert.validity().not_after.timestamp(), "not_after")?;

    let mut is_ca = false;
    let mut dns_names = Vec::new();
    let mut ip_addresses = Vec::new();
    for ext in cert.extensions() {
        match ext.parsed_extension() {
            ParsedExtension::BasicConstraints(bc) => is_ca = bc.ca,
            ParsedExtension::SubjectAlternativeName(san) => {
                for name in &san.general_names {
                    match name {
                        GeneralName::DNSName(dns) => dns_names.push(dns.to_string()),
                        GeneralName::IPAddress(bytes) => {
                            if let Some(ip) = ip_from_bytes(bytes) {
                                ip_addresses.push(ip);
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    Ok(CertificateInfo {
        path: path.to_path_buf(),
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        not_before,
        not_after,
        serial: hex::encode(cert.raw_serial()),
        fingerprint: hex::encode(openssl::hash::hash(
            openssl::hash::MessageDigest::sha256(),
            &cert_der,
        )?),
        is_ca,
        dns_names,
        ip_addresses,
        status: expiration_status(not_after, Utc::now()),
        trust_chain_valid: None,
    })
}

fn ip_from_bytes(bytes: &[u8]) -> Option<String> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(std::net::Ipv4Addr::from(octets).to_string())
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(std::net::Ipv6Addr::from(octets).to_string())
        }
        _ => None,
    }
}

/// Verifies `cert_path` against the single CA certificate in `ca_path`.
pub fn validate_certificate_chain(cert_path: &Path, ca_path: &Path) -> io::Result<bool> {
    let cert_pem = fs::read(cert_path)?;
    let ca_pem = fs::read(ca_path)?;
    let cert = X509::from_pem(&cert_pem).map_err(invalid_data)?;
    let ca = X509::from_pem(&ca_pem).map_err(invalid_data)?;

    let mut builder = X509StoreBuilder::new()?;
    builder.add_cert(ca)?;
    let store = builder.build();
    let chain = Stack::new()?;
    let mut context = X509StoreContext::new()?;
    Ok(context.init(&store, &cert, &chain, |ctx| ctx.verify_cert())?)
}

/// Scans `base_path` for `*.crt` files at any depth. Files that fail to parse
/// are logged and skipped.
pub fn discover_certificates(
    base_path: &Path,
    logger: &mut dyn Logger,
) -> io::Result<Vec<CertificateInfo>> {
    let mut certificates = Vec::new();

    if !base_path.is_dir() {
        logger.log(&format!("Path is not a directory: {}", base_path.display()));
        return Ok(certificates);
    }

    let pattern = format!("{}/**/*.crt", base_path.display());
    logger.debug_log(&format!("Searching for certificates with pattern: {}", pattern));

    let entries = glob::glob(&pattern).map_err(invalid_data)?;
    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                logger.log(&format!("Glob entry error: {}", e));
                continue;
            }
        };

        match analyze_certificate(&path) {
            Ok(info) => {
                logger.debug_log(&format!("Discovered {} at {}", info.subject, path.display()));
                certificates.push(info);
            }
            Err(e) => logger.warn(&format!(
                "Error analyzing certificate at {}: {}",
                path.display(),
                e
            )),
        }
    }

    verify_against_cas(&mut certificates)?;
    certificates.sort_by(|a, b| a.path.cmp(&b.path));

    logger.log(&format!(
        "Certificate discovery complete: {} certificates in {}",
        certificates.len(),
        base_path.display()
    ));
    Ok(certificates)
}

fn verify_against_cas(certificates: &mut [CertificateInfo]) -> io::Result<()> {
    let cas: Vec<(String, PathBuf)> = certificates
        .iter()
        .filter(|c| c.is_ca)
        .map(|c| (c.subject.clone(), c.path.clone()))
        .collect();

    for cert in certificates.iter_mut().filter(|c| !c.is_ca) {
        if let Some((_, ca_path)) = cas.iter().find(|(subject, _)| *subject == cert.issuer) {
            cert.trust_chain_valid = Some(validate_certificate_chain(&cert.path, ca_path)?);
        }
    }
    Ok(())
}
