// src/cert/signer.rs
use super::entity::Certificate;
use super::error::{PkiError, Result};
use super::template::{asn1_to_datetime, is_ca_certificate};

impl Certificate {
    /// Issues the entity's certificate from its CSR, signed by `ca`.
    ///
    /// The leaf never outlives its issuer: `not_after` is clamped to the CA's
    /// own expiry.
    pub fn sign(&mut self, ca: &Certificate) -> Result<&mut Self> {
        let key = self.require_key()?;
        let csr = self.csr().ok_or_else(|| {
            PkiError::Precondition(format!("certificate {} has no signing request", self.name()))
        })?;
        let ca_cert = ca.certificate().ok_or_else(|| {
            PkiError::Precondition(format!("CA {} has no x509 certificate", ca.name()))
        })?;
        if !is_ca_certificate(ca_cert)? {
            return Err(PkiError::Precondition(format!(
                "certificate {} is not a CA",
                ca.name()
            )));
        }
        let ca_key = ca.private_key().ok_or_else(|| {
            PkiError::Precondition(format!("CA {} has no private key", ca.name()))
        })?;

        let csr_key = csr.public_key()?;
        if !csr.verify(&csr_key)? {
            return Err(PkiError::Format(format!(
                "signing request of {} has an invalid signature",
                self.name()
            )));
        }

        let mut template = self.options().generate_template(key)?;
        template.subject = csr.subject_name().to_owned()?;
        let ca_not_after = asn1_to_datetime(ca_cert.not_after())?;
        if template.not_after > ca_not_after {
            template.not_after = ca_not_after;
        }

        let certificate = template.build_certificate(key, Some(ca_cert), ca_key)?;
        self.set_certificate(certificate);
        Ok(self)
    }

    /// `attach_key` → `generate_csr` → `sign`.
    pub fn generate_signed_certificate(&mut self, ca: &Certificate) -> Result<&mut Self> {
        self.attach_key()?.generate_csr()?.sign(ca)
    }
}
