// src/cert/entity.rs
use super::error::{PkiError, Result};
use super::key::{generate_private_key, private_key_to_pem};
use super::options::CertificateOptions;
use openssl::pkey::{PKey, Private};
use openssl::x509::{X509Req, X509};

/// A named certificate under construction: its options plus whatever key,
/// request and certificate have been attached so far.
///
/// Every mutating operation returns `Result<&mut Self>`, so a pipeline such
/// as `cert.attach_key()?.generate_csr()?.sign(&ca)?.persist()?` stops at the
/// first failure and leaves the entity as it was before that step.
pub struct Certificate {
    name: String,
    options: CertificateOptions,
    private_key: Option<PKey<Private>>,
    certificate: Option<X509>,
    csr: Option<X509Req>,
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("name", &self.name)
            .field("common_name", &self.options.common_name)
            .field("has_key", &self.private_key.is_some())
            .field("has_csr", &self.csr.is_some())
            .field("has_certificate", &self.certificate.is_some())
            .finish()
    }
}

impl Certificate {
    pub fn new(name: &str, options: CertificateOptions) -> Self {
        Self {
            name: name.to_string(),
            options,
            private_key: None,
            certificate: None,
            csr: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &CertificateOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut CertificateOptions {
        &mut self.options
    }

    pub fn private_key(&self) -> Option<&PKey<Private>> {
        self.private_key.as_ref()
    }

    pub fn certificate(&self) -> Option<&X509> {
        self.certificate.as_ref()
    }

    pub fn csr(&self) -> Option<&X509Req> {
        self.csr.as_ref()
    }

    pub fn set_private_key(&mut self, key: PKey<Private>) -> &mut Self {
        self.private_key = Some(key);
        self
    }

    pub fn set_certificate(&mut self, certificate: X509) -> &mut Self {
        self.certificate = Some(certificate);
        self
    }

    pub(crate) fn set_csr(&mut self, csr: X509Req) -> &mut Self {
        self.csr = Some(csr);
        self
    }

    /// Generates a private key of `options.bits` unless one is attached.
    pub fn attach_key(&mut self) -> Result<&mut Self> {
        if self.private_key.is_none() {
            self.private_key = Some(generate_private_key(self.options.bits)?);
        }
        Ok(self)
    }

    pub(crate) fn require_key(&self) -> Result<&PKey<Private>> {
        self.private_key.as_ref().ok_or_else(|| {
            PkiError::Precondition(format!("certificate {} has no private key", self.name))
        })
    }

    pub(crate) fn require_certificate(&self) -> Result<&X509> {
        self.certificate.as_ref().ok_or_else(|| {
            PkiError::Precondition(format!("certificate {} has no x509 certificate", self.name))
        })
    }

    /// PEM of the private key, encrypted with the configured passphrase.
    pub fn key_to_pem(&self) -> Result<Vec<u8>> {
        private_key_to_pem(self.require_key()?, &self.options.passphrase)
    }

    pub fn certificate_to_pem(&self) -> Result<Vec<u8>> {
        Ok(self.require_certificate()?.to_pem()?)
    }

    pub fn csr_to_pem(&self) -> Result<Vec<u8>> {
        let csr = self.csr.as_ref().ok_or_else(|| {
            PkiError::Precondition(format!("certificate {} has no signing request", self.name))
        })?;
        Ok(csr.to_pem()?)
    }
}
