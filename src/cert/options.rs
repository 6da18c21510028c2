// src/cert/options.rs
use super::error::{PkiError, Result};
use super::key::DEFAULT_KEY_BITS;
use openssl::nid::Nid;
use openssl::x509::{X509Name, X509NameBuilder};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

pub const DEFAULT_DURATION_DAYS: u32 = 365;
pub const DEFAULT_CERTS_DIR: &str = "certificates";

/// What a certificate is used for. Drives key usage and extended key usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsedAs {
    #[default]
    Server,
    Ca,
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtKeyUsage {
    ServerAuth,
    ClientAuth,
}

impl UsedAs {
    /// Usage implied by an explicit extended key usage list: client-only lists
    /// mean `Client`, anything else is a server certificate.
    pub fn from_ext_key_usage(usages: &[ExtKeyUsage]) -> Self {
        if !usages.is_empty() && usages.iter().all(|u| *u == ExtKeyUsage::ClientAuth) {
            UsedAs::Client
        } else {
            UsedAs::Server
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateOptions {
    pub common_name: String,
    pub certs_dir: PathBuf,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub bits: u32,
    #[serde(skip_serializing)]
    pub passphrase: String,
    pub organization: String,
    pub organizational_unit: String,
    pub locality: String,
    pub province: String,
    pub country: String,
    pub duration_days: u32,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    pub uris: Vec<String>,
    pub used_as: UsedAs,
    /// Overrides the extended key usage derived from `used_as` when non-empty.
    pub ext_key_usage: Vec<ExtKeyUsage>,
}

impl Default for CertificateOptions {
    fn default() -> Self {
        Self {
            common_name: String::new(),
            certs_dir: PathBuf::from(DEFAULT_CERTS_DIR),
            cert_file: None,
            key_file: None,
            bits: DEFAULT_KEY_BITS,
            passphrase: String::new(),
            organization: String::new(),
            organizational_unit: String::new(),
            locality: String::new(),
            province: String::new(),
            country: String::new(),
            duration_days: DEFAULT_DURATION_DAYS,
            dns_names: Vec::new(),
            ip_addresses: Vec::new(),
            uris: Vec::new(),
            used_as: UsedAs::Server,
            ext_key_usage: Vec::new(),
        }
    }
}

impl CertificateOptions {
    pub fn new(common_name: &str) -> Self {
        Self {
            common_name: common_name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_certs_dir(mut self, certs_dir: impl Into<PathBuf>) -> Self {
        self.certs_dir = certs_dir.into();
        self
    }

    pub fn key_path(&self) -> PathBuf {
        self.key_file
            .clone()
            .unwrap_or_else(|| self.certs_dir.join(format!("{}.key", self.common_name)))
    }

    pub fn cert_path(&self) -> PathBuf {
        self.cert_file
            .clone()
            .unwrap_or_else(|| self.certs_dir.join(format!("{}.crt", self.common_name)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.common_name.trim().is_empty() {
            return Err(PkiError::Validation("common name is required".to_string()));
        }
        if self.duration_days == 0 {
            return Err(PkiError::Validation(format!(
                "certificate {} must be valid for at least one day",
                self.common_name
            )));
        }
        Ok(())
    }

    /// Extended key usages the certificate will carry.
    pub fn effective_ext_key_usage(&self) -> Vec<ExtKeyUsage> {
        match self.used_as {
            UsedAs::Ca => Vec::new(),
            _ if !self.ext_key_usage.is_empty() => self.ext_key_usage.clone(),
            UsedAs::Client => vec![ExtKeyUsage::ClientAuth],
            UsedAs::Server => vec![ExtKeyUsage::ServerAuth],
        }
    }

    /// Appends a flat list of names to the SAN lists, classifying each one.
    pub fn add_alt_names<S: AsRef<str>>(&mut self, names: &[S]) {
        let classified = AltNames::classify(names);
        self.ip_addresses.extend(classified.ip_addresses);
        self.uris.extend(classified.uris);
        self.dns_names.extend(classified.dns_names);
    }

    pub fn has_alt_names(&self) -> bool {
        !self.dns_names.is_empty() || !self.ip_addresses.is_empty() || !self.uris.is_empty()
    }

    pub fn generate_subject(&self) -> Result<X509Name> {
        let mut name = X509NameBuilder::new()?;
        let entries = [
            (Nid::COUNTRYNAME, &self.country),
            (Nid::STATEORPROVINCENAME, &self.province),
            (Nid::LOCALITYNAME, &self.locality),
            (Nid::ORGANIZATIONNAME, &self.organization),
            (Nid::ORGANIZATIONALUNITNAME, &self.organizational_unit),
            (Nid::COMMONNAME, &self.common_name),
        ];
        for (nid, value) in entries {
            if !value.is_empty() {
                name.append_entry_by_nid(nid, value)?;
            }
        }
        Ok(name.build())
    }
}

/// Subject alternative names split by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AltNames {
    pub ip_addresses: Vec<IpAddr>,
    pub uris: Vec<String>,
    pub dns_names: Vec<String>,
}

impl AltNames {
    /// IP literals first, then absolute URIs (scheme plus host), everything
    /// else is a DNS name. Order within each bucket is preserved.
    pub fn classify<S: AsRef<str>>(names: &[S]) -> Self {
        let mut alt_names = AltNames::default();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            if let Ok(ip) = name.parse::<IpAddr>() {
                alt_names.ip_addresses.push(ip);
            } else if url::Url::parse(name).map(|u| u.has_host()).unwrap_or(false) {
                alt_names.uris.push(name.to_string());
            } else {
                alt_names.dns_names.push(name.to_string());
            }
        }
        alt_names
    }
}
